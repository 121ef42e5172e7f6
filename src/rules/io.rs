//! File readers and writers.
//!
//! Readers are source rules: they take no input and write their table to the
//! main or a named output. Writers are sinks: they consume a table and
//! produce nothing, so they have no say in a plan's mode.
//!
//! `file_name` and `file_dir` may refer to run context parameters:
//!
//! ```yaml
//! ReadCSVFileRule:
//!   file_name: "{context.region}_sales.csv"
//!   file_dir: /data/in
//! ```
//!
//! With `regex: true` a reader loads every file of `file_dir` whose name
//! matches `file_name` from its start, in name order, and stacks them.

use super::expressions::ScalarValue;
use super::{FrameRule, frame_rule_io, rule_builders};
use crate::context::Context;
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Read as _};
use std::path::{Path, PathBuf};

fn default_separator() -> String {
    ",".to_owned()
}

fn default_true() -> bool {
    true
}

/// Interpolate `file_dir` and `file_name` against the run context.
fn resolve_path(context: &Context, file_name: &str, file_dir: Option<&str>) -> Result<PathBuf> {
    let file_name = context.interpolate(file_name)?;
    Ok(match file_dir {
        Some(dir) => PathBuf::from(context.interpolate(dir)?).join(file_name),
        None => PathBuf::from(file_name),
    })
}

fn existing_path(context: &Context, file_name: &str, file_dir: Option<&str>) -> Result<PathBuf> {
    let path = resolve_path(context, file_name, file_dir)?;
    if !path.is_file() {
        return Err(not_found(format!("File not found: {}", path.display())));
    }
    Ok(path)
}

fn not_found(message: String) -> EtlError {
    EtlError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, message))
}

/// The files a reader loads, in the order they are stacked.
fn input_paths(context: &Context, file_name: &str, file_dir: Option<&str>, regex: bool) -> Result<Vec<PathBuf>> {
    if !regex {
        return Ok(vec![existing_path(context, file_name, file_dir)?]);
    }
    let pattern = context.interpolate(file_name)?;
    let matcher = Regex::new(&format!("^(?:{pattern})"))
        .map_err(|e| EtlError::InvalidRule(format!("Invalid file_name pattern '{pattern}': {e}")))?;
    let dir = match file_dir {
        Some(dir) => PathBuf::from(context.interpolate(dir)?),
        None => PathBuf::from("."),
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| matcher.is_match(name));
        if matches && path.is_file() {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(not_found(format!(
            "No file in {} matches '{pattern}'",
            dir.display()
        )));
    }
    paths.sort();
    Ok(paths)
}

/// Stack the tables read from several files.
fn stack(frames: Vec<LazyFrame>) -> Result<LazyFrame> {
    match <[LazyFrame; 1]>::try_from(frames) {
        Ok([single]) => Ok(single),
        Err(frames) => Ok(concat(frames, UnionArgs::default())?),
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn separator_byte(kind: &str, separator: &str) -> Result<u8> {
    match separator.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(EtlError::InvalidRule(format!(
            "{kind}: separator must be a single ASCII character, got '{separator}'"
        ))),
    }
}

fn check_file_name(kind: &str, file_name: &str) -> Result<()> {
    if file_name.is_empty() {
        return Err(EtlError::InvalidRule(format!("{kind}: file_name cannot be empty")));
    }
    Ok(())
}

/// Reads a CSV file, or all the files matching a pattern.
///
/// Files ending in `.gz` are decompressed first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadCSVFileRule {
    pub file_name: String,
    #[serde(default)]
    pub file_dir: Option<String>,
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_true")]
    pub header: bool,
    #[serde(default)]
    pub skip_header_rows: Option<usize>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl ReadCSVFileRule {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_dir: None,
            regex: false,
            separator: default_separator(),
            header: true,
            skip_header_rows: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_file_dir(mut self, file_dir: impl Into<String>) -> Self {
        self.file_dir = Some(file_dir.into());
        self
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] unless `separator` is a single byte.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Result<Self> {
        self.separator = separator.into();
        self.prepare()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    #[must_use]
    pub fn with_skip_header_rows(mut self, rows: usize) -> Self {
        self.skip_header_rows = Some(rows);
        self
    }

    /// Treat `file_name` as a pattern over the names in `file_dir`.
    #[must_use]
    pub fn with_regex(mut self, regex: bool) -> Self {
        self.regex = regex;
        self
    }

    fn read(&self, path: &Path) -> Result<LazyFrame> {
        let separator = separator_byte(Self::KIND, &self.separator)?;
        let skip_rows = self.skip_header_rows.unwrap_or(0);
        if is_gzip(path) {
            let mut bytes = Vec::new();
            GzDecoder::new(File::open(path)?).read_to_end(&mut bytes)?;
            let df = CsvReadOptions::default()
                .with_has_header(self.header)
                .with_skip_rows(skip_rows)
                .with_parse_options(CsvParseOptions::default().with_separator(separator))
                .into_reader_with_file_handle(Cursor::new(bytes))
                .finish()?;
            return Ok(df.lazy());
        }
        Ok(LazyCsvReader::new(path)
            .with_separator(separator)
            .with_has_header(self.header)
            .with_skip_rows(skip_rows)
            .finish()?)
    }
}

rule_builders!(ReadCSVFileRule, source);

impl FrameRule for ReadCSVFileRule {
    frame_rule_io!(source, "ReadCSVFileRule");

    fn prepare(&mut self) -> Result<()> {
        check_file_name(Self::KIND, &self.file_name)?;
        separator_byte(Self::KIND, &self.separator).map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let paths = input_paths(data.context(), &self.file_name, self.file_dir.as_deref(), self.regex)?;
        let frames = paths
            .iter()
            .map(|path| {
                tracing::debug!(path = %path.display(), "Reading CSV file");
                self.read(path)
            })
            .collect::<Result<Vec<_>>>()?;
        data.set_output(self.named_output.as_deref(), F::from_lazy(stack(frames)?)?);
        Ok(())
    }
}

/// Comparison of a parquet row filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==", alias = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
}

/// The right hand side of a condition: a list for `in`/`not in`, a scalar
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Many(Vec<ScalarValue>),
    One(ScalarValue),
}

/// `[column, op, value]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition(pub String, pub FilterOp, pub FilterValue);

impl Condition {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<ScalarValue>) -> Self {
        Self(column.into(), op, FilterValue::One(value.into()))
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self(
            column.into(),
            FilterOp::In,
            FilterValue::Many(values.into_iter().map(Into::into).collect()),
        )
    }

    fn to_expr(&self) -> Result<Expr> {
        let Self(column, op, value) = self;
        let c = col(column.as_str());
        let scalar = || match value {
            FilterValue::One(v) => Ok(v.to_lit()),
            FilterValue::Many(_) => Err(EtlError::InvalidRule(format!(
                "ReadParquetFileRule: filter on '{column}' needs a single value for {op:?}"
            ))),
        };
        Ok(match op {
            FilterOp::Eq => c.eq(scalar()?),
            FilterOp::NotEq => c.neq(scalar()?),
            FilterOp::Gt => c.gt(scalar()?),
            FilterOp::GtEq => c.gt_eq(scalar()?),
            FilterOp::Lt => c.lt(scalar()?),
            FilterOp::LtEq => c.lt_eq(scalar()?),
            FilterOp::In | FilterOp::NotIn => {
                let FilterValue::Many(values) = value else {
                    return Err(EtlError::InvalidRule(format!(
                        "ReadParquetFileRule: filter on '{column}' needs a list of values for {op:?}"
                    )));
                };
                let any = values
                    .iter()
                    .map(|v| c.clone().eq(v.to_lit()))
                    .reduce(|a, b| a.or(b))
                    .unwrap_or_else(|| lit(false));
                if *op == FilterOp::In { any } else { any.not() }
            }
        })
    }
}

/// Row filters applied while reading parquet.
///
/// A flat list of conditions is AND-ed. A list of lists OR-s the inner
/// lists, each of which is AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowFilters {
    AnyOf(Vec<Vec<Condition>>),
    AllOf(Vec<Condition>),
}

fn all_of(conditions: &[Condition]) -> Result<Expr> {
    conditions
        .iter()
        .map(Condition::to_expr)
        .reduce(|a, b| Ok(a?.and(b?)))
        .unwrap_or_else(|| {
            Err(EtlError::InvalidRule(
                "ReadParquetFileRule: filters cannot contain an empty list of conditions".to_owned(),
            ))
        })
}

impl RowFilters {
    fn to_expr(&self) -> Result<Expr> {
        match self {
            Self::AllOf(conditions) => all_of(conditions),
            Self::AnyOf(groups) => groups
                .iter()
                .map(|group| all_of(group))
                .reduce(|a, b| Ok(a?.or(b?)))
                .unwrap_or_else(|| {
                    Err(EtlError::InvalidRule("ReadParquetFileRule: filters cannot be empty".to_owned()))
                }),
        }
    }

    fn columns(&self) -> Vec<&String> {
        match self {
            Self::AllOf(conditions) => conditions.iter().map(|c| &c.0).collect(),
            Self::AnyOf(groups) => groups.iter().flatten().map(|c| &c.0).collect(),
        }
    }
}

/// Reads a parquet file, or all the files matching a pattern, optionally
/// only some of its `columns` and the rows passing `filters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadParquetFileRule {
    pub file_name: String,
    #[serde(default)]
    pub file_dir: Option<String>,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Option<RowFilters>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl ReadParquetFileRule {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_dir: None,
            regex: false,
            columns: None,
            filters: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    /// Treat `file_name` as a pattern over the names in `file_dir`.
    #[must_use]
    pub fn with_regex(mut self, regex: bool) -> Self {
        self.regex = regex;
        self
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] for an empty filter list or a value that
    /// does not fit its comparison.
    pub fn with_filters(mut self, filters: RowFilters) -> Result<Self> {
        self.filters = Some(filters);
        self.prepare()?;
        Ok(self)
    }

    fn read(&self, path: &Path) -> Result<LazyFrame> {
        let mut lf = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?;
        let available: Vec<String> = lf
            .collect_schema()?
            .iter_names()
            .map(|name| name.as_str().to_owned())
            .collect();
        if let Some(filters) = &self.filters {
            super::validation::check_columns(&available, filters.columns(), "Missing filter columns in parquet file")?;
            lf = lf.filter(filters.to_expr()?);
        }
        if let Some(columns) = &self.columns {
            super::validation::check_columns(&available, columns, "Missing columns in parquet file")?;
            lf = lf.select(columns.iter().map(|c| col(c.as_str())).collect::<Vec<_>>());
        }
        Ok(lf)
    }

    #[must_use]
    pub fn with_file_dir(mut self, file_dir: impl Into<String>) -> Self {
        self.file_dir = Some(file_dir.into());
        self
    }

    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

rule_builders!(ReadParquetFileRule, source);

impl FrameRule for ReadParquetFileRule {
    frame_rule_io!(source, "ReadParquetFileRule");

    fn prepare(&mut self) -> Result<()> {
        check_file_name(Self::KIND, &self.file_name)?;
        match &self.filters {
            Some(filters) => filters.to_expr().map(|_| ()),
            None => Ok(()),
        }
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let paths = input_paths(data.context(), &self.file_name, self.file_dir.as_deref(), self.regex)?;
        let frames = paths
            .iter()
            .map(|path| {
                tracing::debug!(path = %path.display(), "Reading parquet file");
                self.read(path)
            })
            .collect::<Result<Vec<_>>>()?;
        data.set_output(self.named_output.as_deref(), F::from_lazy(stack(frames)?)?);
        Ok(())
    }
}

/// Compression of a written CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvCompression {
    /// `file_name` must end in `.gz`.
    Gzip,
}

/// Writes a table to a CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteCSVFileRule {
    pub file_name: String,
    #[serde(default)]
    pub file_dir: Option<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_true")]
    pub header: bool,
    #[serde(default)]
    pub compression: Option<CsvCompression>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl WriteCSVFileRule {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_dir: None,
            separator: default_separator(),
            header: true,
            compression: None,
            named_input: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_file_dir(mut self, file_dir: impl Into<String>) -> Self {
        self.file_dir = Some(file_dir.into());
        self
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] unless `separator` is a single byte.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Result<Self> {
        self.separator = separator.into();
        self.prepare()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] when `file_name` lacks the extension of
    /// `compression`.
    pub fn with_compression(mut self, compression: CsvCompression) -> Result<Self> {
        self.compression = Some(compression);
        self.prepare()?;
        Ok(self)
    }

    fn write(&self, writer: impl std::io::Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer)
            .include_header(self.header)
            .with_separator(separator_byte(Self::KIND, &self.separator)?)
            .finish(df)?;
        Ok(())
    }
}

rule_builders!(WriteCSVFileRule, sink);

impl FrameRule for WriteCSVFileRule {
    frame_rule_io!(sink, "WriteCSVFileRule");

    fn prepare(&mut self) -> Result<()> {
        check_file_name(Self::KIND, &self.file_name)?;
        if self.compression == Some(CsvCompression::Gzip) && !self.file_name.ends_with(".gz") {
            return Err(EtlError::InvalidRule(format!(
                "WriteCSVFileRule: file_name '{}' must end in .gz when compression is gzip",
                self.file_name
            )));
        }
        separator_byte(Self::KIND, &self.separator).map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let path = resolve_path(data.context(), &self.file_name, self.file_dir.as_deref())?;
        let mut df = data.input_cloned(self.named_input.as_deref())?.into_df()?;
        tracing::debug!(path = %path.display(), rows = df.height(), compression = ?self.compression, "Writing CSV file");
        let file = File::create(&path)?;
        match self.compression {
            Some(CsvCompression::Gzip) => {
                let mut encoder = GzEncoder::new(file, flate2::Compression::default());
                self.write(&mut encoder, &mut df)?;
                encoder.finish()?;
            }
            None => self.write(file, &mut df)?,
        }
        Ok(())
    }
}

/// Parquet compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Uncompressed,
    Snappy,
    Gzip,
    Lz4,
    Zstd,
    Brotli,
}

impl From<Compression> for ParquetCompression {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::Uncompressed => Self::Uncompressed,
            Compression::Snappy => Self::Snappy,
            Compression::Gzip => Self::Gzip(None),
            Compression::Lz4 => Self::Lz4Raw,
            Compression::Zstd => Self::Zstd(None),
            Compression::Brotli => Self::Brotli(None),
        }
    }
}

/// Writes a table to a parquet file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteParquetFileRule {
    pub file_name: String,
    #[serde(default)]
    pub file_dir: Option<String>,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl WriteParquetFileRule {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_dir: None,
            compression: Compression::default(),
            named_input: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_file_dir(mut self, file_dir: impl Into<String>) -> Self {
        self.file_dir = Some(file_dir.into());
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

rule_builders!(WriteParquetFileRule, sink);

impl FrameRule for WriteParquetFileRule {
    frame_rule_io!(sink, "WriteParquetFileRule");

    fn prepare(&mut self) -> Result<()> {
        check_file_name(Self::KIND, &self.file_name)
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let path = resolve_path(data.context(), &self.file_name, self.file_dir.as_deref())?;
        let mut df = data.input_cloned(self.named_input.as_deref())?.into_df()?;
        tracing::debug!(path = %path.display(), rows = df.height(), "Writing parquet file");
        let file = File::create(&path)?;
        ParquetWriter::new(file)
            .with_compression(self.compression.into())
            .finish(&mut df)?;
        Ok(())
    }
}
