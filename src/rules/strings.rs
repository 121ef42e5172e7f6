//! String column transformations.
//!
//! Every rule here takes `columns` and an optional `output_columns` list of
//! the same length. Without output columns the inputs are transformed in
//! place; with them, results go to the paired new columns, which must not
//! exist yet when the rule is strict.

use super::validation::{check_columns, check_new_columns};
use super::{FrameRule, columns_in_out, frame_rule_io, per_column, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::slice;

fn owned<I, S>(columns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    columns.into_iter().map(Into::into).collect()
}

/// Rules with no parameters besides their columns.
macro_rules! simple_string_rule {
    ($(#[$doc:meta])* $name:ident, $kind:literal, $expr:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub columns: Vec<String>,
            #[serde(default)]
            pub output_columns: Option<Vec<String>>,
            #[serde(default)]
            pub named_input: Option<String>,
            #[serde(default)]
            pub named_output: Option<String>,
            #[serde(flatten)]
            pub meta: RuleMeta,
        }

        impl $name {
            pub fn new<I, S>(columns: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                Self {
                    columns: owned(columns),
                    output_columns: None,
                    named_input: None,
                    named_output: None,
                    meta: RuleMeta::default(),
                }
            }

            #[must_use]
            pub fn with_output_columns<I, S>(mut self, output_columns: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.output_columns = Some(owned(output_columns));
                self
            }
        }

        rule_builders!($name, unary);

        impl FrameRule for $name {
            frame_rule_io!(unary, $kind);

            fn prepare(&mut self) -> Result<()> {
                super::validation::pair_columns($kind, &self.columns, self.output_columns.as_deref())
                    .map(|_| ())
            }

            fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
                per_column(data, &columns_in_out!(self), $expr)
            }
        }
    };
}

simple_string_rule!(
    /// Lower-cases strings.
    StrLowerRule,
    "StrLowerRule",
    |e: Expr| e.str().to_lowercase()
);

simple_string_rule!(
    /// Upper-cases strings.
    StrUpperRule,
    "StrUpperRule",
    |e: Expr| e.str().to_uppercase()
);

simple_string_rule!(
    /// Upper-cases the first character and lower-cases the rest.
    StrCapitalizeRule,
    "StrCapitalizeRule",
    |e: Expr| {
        concat_str(
            [
                e.clone().str().slice(lit(0), lit(1)).str().to_uppercase(),
                e.str().slice(lit(1), lit(NULL)).str().to_lowercase(),
            ],
            "",
            false,
        )
    }
);

/// Which end(s) of a string to work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    #[default]
    Both,
}

/// Strips whitespace (or the given `characters`) from one or both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrStripRule {
    pub columns: Vec<String>,
    #[serde(default)]
    pub how: Side,
    #[serde(default)]
    pub characters: Option<String>,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl StrStripRule {
    pub fn new<I, S>(columns: I, how: Side) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: owned(columns),
            how,
            characters: None,
            output_columns: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_characters(mut self, characters: impl Into<String>) -> Self {
        self.characters = Some(characters.into());
        self
    }

    #[must_use]
    pub fn with_output_columns<I, S>(mut self, output_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_columns = Some(owned(output_columns));
        self
    }
}

rule_builders!(StrStripRule, unary);

impl FrameRule for StrStripRule {
    frame_rule_io!(unary, "StrStripRule");

    fn prepare(&mut self) -> Result<()> {
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let chars = || match &self.characters {
            Some(chars) => lit(chars.as_str()),
            None => lit(NULL),
        };
        per_column(data, &columns_in_out!(self), |e| match self.how {
            Side::Left => e.str().strip_chars_start(chars()),
            Side::Right => e.str().strip_chars_end(chars()),
            Side::Both => e.str().strip_chars(chars()),
        })
    }
}

/// Pads strings shorter than `width` with `fill_character`.
///
/// `how` is the side the padding goes on; `both` is not supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrPadRule {
    pub columns: Vec<String>,
    pub width: usize,
    pub fill_character: String,
    pub how: Side,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl StrPadRule {
    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] unless `fill_character` is a single
    /// character and `how` is left or right.
    pub fn new<I, S>(columns: I, width: usize, fill_character: impl Into<String>, how: Side) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = Self {
            columns: owned(columns),
            width,
            fill_character: fill_character.into(),
            how,
            output_columns: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    #[must_use]
    pub fn with_output_columns<I, S>(mut self, output_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_columns = Some(owned(output_columns));
        self
    }

    fn fill_char(&self) -> Result<char> {
        let mut chars = self.fill_character.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(EtlError::InvalidRule(format!(
                "StrPadRule: fill_character must be a single character, got '{}'",
                self.fill_character
            ))),
        }
    }
}

rule_builders!(StrPadRule, unary);

impl FrameRule for StrPadRule {
    frame_rule_io!(unary, "StrPadRule");

    fn prepare(&mut self) -> Result<()> {
        self.fill_char()?;
        if self.how == Side::Both {
            return Err(EtlError::InvalidRule(
                "StrPadRule: how must be 'left' or 'right'".to_owned(),
            ));
        }
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let fill = self.fill_char()?;
        let width = self.width;
        per_column(data, &columns_in_out!(self), |e| match self.how {
            Side::Left => e.str().pad_start(width, fill),
            Side::Right | Side::Both => e.str().pad_end(width, fill),
        })
    }
}

/// Replaces each of `values` with the matching entry of `new_values`.
///
/// With `regex`, values are regular expressions and replacements may use
/// `$1`-style group references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrReplaceRule {
    pub columns: Vec<String>,
    pub values: Vec<String>,
    pub new_values: Vec<String>,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl StrReplaceRule {
    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] if the value lists differ in length, and
    /// [`EtlError::ExpressionSyntax`] for an invalid pattern.
    pub fn new<I, S, V, N>(columns: I, values: V, new_values: N, regex: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        V: IntoIterator<Item = S>,
        N: IntoIterator<Item = S>,
    {
        let mut rule = Self {
            columns: owned(columns),
            values: owned(values),
            new_values: owned(new_values),
            regex,
            output_columns: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    #[must_use]
    pub fn with_output_columns<I, S>(mut self, output_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_columns = Some(owned(output_columns));
        self
    }
}

rule_builders!(StrReplaceRule, unary);

impl FrameRule for StrReplaceRule {
    frame_rule_io!(unary, "StrReplaceRule");

    fn prepare(&mut self) -> Result<()> {
        if self.values.len() != self.new_values.len() {
            return Err(EtlError::InvalidRule(format!(
                "StrReplaceRule: values and new_values must have the same length ({} != {})",
                self.values.len(),
                self.new_values.len()
            )));
        }
        if self.regex {
            for pattern in &self.values {
                regex::Regex::new(pattern).map_err(|e| {
                    EtlError::ExpressionSyntax(format!("Invalid pattern '{pattern}': {e}"))
                })?;
            }
        }
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let literal = !self.regex;
        per_column(data, &columns_in_out!(self), |e| {
            self.values
                .iter()
                .zip(&self.new_values)
                .fold(e, |acc, (value, new_value)| {
                    acc.str()
                        .replace_all(lit(value.as_str()), lit(new_value.as_str()), literal)
                })
        })
    }
}

/// Stands in for regex and limited separators so the split itself is literal.
const SPLIT_MARK: &str = "\u{1f}";

/// The separator of a split rule and whether it is a literal string.
fn split_separator<'a>(
    kind: &str,
    separator: Option<&'a str>,
    separator_regex: Option<&'a str>,
    limit: Option<usize>,
) -> Result<(&'a str, bool)> {
    if limit == Some(0) {
        return Err(EtlError::InvalidRule(format!("{kind}: limit must be positive")));
    }
    match (separator, separator_regex) {
        (Some(separator), None) if !separator.is_empty() => Ok((separator, true)),
        (None, Some(pattern)) => {
            Regex::new(pattern).map_err(|e| {
                EtlError::ExpressionSyntax(format!("Invalid pattern '{pattern}': {e}"))
            })?;
            Ok((pattern, false))
        }
        _ => Err(EtlError::InvalidRule(format!(
            "{kind}: exactly one of separator and separator_regex must be set"
        ))),
    }
}

/// Split strings into a `List(String)` at most `limit` times.
fn split_expr(e: Expr, separator: &str, literal: bool, limit: Option<usize>) -> Expr {
    if literal && limit.is_none() {
        return e.str().split(lit(separator));
    }
    let marked = match limit {
        Some(n) if literal => e.str().replace_n(
            lit(separator),
            lit(SPLIT_MARK),
            true,
            i64::try_from(n).unwrap_or(i64::MAX),
        ),
        // polars only replaces the first n regex matches for n = 1
        Some(n) => (0..n).fold(e, |acc, _| acc.str().replace(lit(separator), lit(SPLIT_MARK), false)),
        None => e.str().replace_all(lit(separator), lit(SPLIT_MARK), literal),
    };
    marked.str().split(lit(SPLIT_MARK))
}

/// Splits strings into lists at `separator` or at matches of
/// `separator_regex`.
///
/// With `limit`, at most that many splits are made and the remainder stays
/// in the last item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrSplitRule {
    pub columns: Vec<String>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub separator_regex: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl StrSplitRule {
    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] for an empty separator.
    pub fn new<I, S>(columns: I, separator: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(owned(columns), Some(separator.into()), None)
    }

    /// # Errors
    ///
    /// [`EtlError::ExpressionSyntax`] for an invalid pattern.
    pub fn new_regex<I, S>(columns: I, separator_regex: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(owned(columns), None, Some(separator_regex.into()))
    }

    fn build(columns: Vec<String>, separator: Option<String>, separator_regex: Option<String>) -> Result<Self> {
        let mut rule = Self {
            columns,
            separator,
            separator_regex,
            limit: None,
            output_columns: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] for a zero limit.
    pub fn with_limit(mut self, limit: usize) -> Result<Self> {
        self.limit = Some(limit);
        self.prepare()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_output_columns<I, S>(mut self, output_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_columns = Some(owned(output_columns));
        self
    }
}

rule_builders!(StrSplitRule, unary);

impl FrameRule for StrSplitRule {
    frame_rule_io!(unary, "StrSplitRule");

    fn prepare(&mut self) -> Result<()> {
        split_separator(Self::KIND, self.separator.as_deref(), self.separator_regex.as_deref(), self.limit)?;
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let (separator, literal) =
            split_separator(Self::KIND, self.separator.as_deref(), self.separator_regex.as_deref(), self.limit)?;
        per_column(data, &columns_in_out!(self), |e| split_expr(e, separator, literal, self.limit))
    }
}

/// Order of the items when rejoining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

fn default_new_separator() -> String {
    ",".to_owned()
}

/// Splits strings like [`StrSplitRule`], optionally sorts the items, and
/// joins them back with `new_separator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrSplitRejoinRule {
    pub columns: Vec<String>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub separator_regex: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default = "default_new_separator")]
    pub new_separator: String,
    #[serde(default)]
    pub sort: Option<SortOrder>,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl StrSplitRejoinRule {
    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] for an empty separator.
    pub fn new<I, S>(columns: I, separator: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(owned(columns), Some(separator.into()), None)
    }

    /// # Errors
    ///
    /// [`EtlError::ExpressionSyntax`] for an invalid pattern.
    pub fn new_regex<I, S>(columns: I, separator_regex: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(owned(columns), None, Some(separator_regex.into()))
    }

    fn build(columns: Vec<String>, separator: Option<String>, separator_regex: Option<String>) -> Result<Self> {
        let mut rule = Self {
            columns,
            separator,
            separator_regex,
            limit: None,
            new_separator: default_new_separator(),
            sort: None,
            output_columns: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] for a zero limit.
    pub fn with_limit(mut self, limit: usize) -> Result<Self> {
        self.limit = Some(limit);
        self.prepare()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_new_separator(mut self, new_separator: impl Into<String>) -> Self {
        self.new_separator = new_separator.into();
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn with_output_columns<I, S>(mut self, output_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_columns = Some(owned(output_columns));
        self
    }
}

rule_builders!(StrSplitRejoinRule, unary);

impl FrameRule for StrSplitRejoinRule {
    frame_rule_io!(unary, "StrSplitRejoinRule");

    fn prepare(&mut self) -> Result<()> {
        split_separator(Self::KIND, self.separator.as_deref(), self.separator_regex.as_deref(), self.limit)?;
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let (separator, literal) =
            split_separator(Self::KIND, self.separator.as_deref(), self.separator_regex.as_deref(), self.limit)?;
        per_column(data, &columns_in_out!(self), |e| {
            let items = split_expr(e, separator, literal, self.limit);
            let items = match self.sort {
                Some(order) => items.list().sort(
                    SortOptions::default().with_order_descending(order == SortOrder::Descending),
                ),
                None => items,
            };
            items.list().join(lit(self.new_separator.as_str()), true)
        })
    }
}

/// Extracts the capture groups of `regular_expression` from `input_column`.
///
/// Without `output_columns` the pattern must have a single group and the
/// input column is overwritten; otherwise each group goes to the matching
/// output column. Rows that do not match get nulls, or, with
/// `keep_original_value`, the original string in the first output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrExtractRule {
    pub input_column: String,
    pub regular_expression: String,
    #[serde(default)]
    pub keep_original_value: bool,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl StrExtractRule {
    /// # Errors
    ///
    /// [`EtlError::ExpressionSyntax`] for an invalid pattern and
    /// [`EtlError::InvalidRule`] unless it has exactly one group.
    pub fn new(input_column: impl Into<String>, regular_expression: impl Into<String>) -> Result<Self> {
        let mut rule = Self {
            input_column: input_column.into(),
            regular_expression: regular_expression.into(),
            keep_original_value: false,
            output_columns: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    /// Extract every group of `regular_expression` into `output_columns`.
    ///
    /// # Errors
    ///
    /// [`EtlError::ExpressionSyntax`] for an invalid pattern and
    /// [`EtlError::InvalidRule`] unless there is one output per group.
    pub fn new_to_columns<I, S>(
        input_column: impl Into<String>,
        regular_expression: impl Into<String>,
        output_columns: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = Self {
            input_column: input_column.into(),
            regular_expression: regular_expression.into(),
            keep_original_value: false,
            output_columns: Some(owned(output_columns)),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    #[must_use]
    pub fn with_keep_original_value(mut self, keep_original_value: bool) -> Self {
        self.keep_original_value = keep_original_value;
        self
    }

    fn outputs(&self) -> &[String] {
        self.output_columns.as_deref().unwrap_or(slice::from_ref(&self.input_column))
    }
}

rule_builders!(StrExtractRule, unary);

impl FrameRule for StrExtractRule {
    frame_rule_io!(unary, "StrExtractRule");

    fn prepare(&mut self) -> Result<()> {
        let pattern = Regex::new(&self.regular_expression).map_err(|e| {
            EtlError::ExpressionSyntax(format!("Invalid pattern '{}': {e}", self.regular_expression))
        })?;
        let groups = pattern.captures_len() - 1;
        let outputs = self.outputs().len();
        if groups != outputs {
            return Err(EtlError::InvalidRule(format!(
                "StrExtractRule: the pattern has {groups} group(s) but {outputs} output column(s)"
            )));
        }
        Ok(())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            if !available.contains(&self.input_column) {
                if self.meta.strict {
                    check_columns(available, slice::from_ref(&self.input_column), "Missing columns")?;
                }
                return Ok(lf);
            }
            if self.meta.strict && self.output_columns.is_some() {
                check_new_columns(available, self.outputs())?;
            }
            let input = || col(self.input_column.as_str());
            let exprs = self.outputs().iter().enumerate().map(|(i, output)| {
                let group = input().str().extract(lit(self.regular_expression.as_str()), i + 1);
                let group = if i == 0 && self.keep_original_value { group.fill_null(input()) } else { group };
                group.alias(output.as_str())
            });
            Ok(lf.with_columns(exprs.collect::<Vec<_>>()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_utils::{assert_round_trip, names, run_eager, run_lazy, strs};

    fn sample() -> DataFrame {
        df!("A" => ["  aBc ", "Def", "gHI  "], "B" => ["x", "y", "z"]).unwrap()
    }

    fn owned_strs(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some((*v).to_owned())).collect()
    }

    #[test]
    fn test_lower_upper_in_place() -> Result<()> {
        let out = run_eager(&StrLowerRule::new(["A"]), sample())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["  abc ", "def", "ghi  "]));

        let out = run_lazy(&StrUpperRule::new(["A", "B"]), sample())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["  ABC ", "DEF", "GHI  "]));
        assert_eq!(strs(&out, "B"), owned_strs(&["X", "Y", "Z"]));
        Ok(())
    }

    #[test]
    fn test_capitalize() -> Result<()> {
        let df = df!("A" => ["hello WORLD", "x", ""])?;
        let out = run_eager(&StrCapitalizeRule::new(["A"]), df)?;
        assert_eq!(strs(&out, "A"), owned_strs(&["Hello world", "X", ""]));
        Ok(())
    }

    #[test]
    fn test_output_columns() -> Result<()> {
        let rule = StrUpperRule::new(["B"]).with_output_columns(["B2"]);
        let out = run_eager(&rule, sample())?;
        assert_eq!(names(&out), vec!["A", "B", "B2"]);
        assert_eq!(strs(&out, "B"), owned_strs(&["x", "y", "z"]));
        assert_eq!(strs(&out, "B2"), owned_strs(&["X", "Y", "Z"]));
        Ok(())
    }

    #[test]
    fn test_output_column_collision() -> Result<()> {
        let rule = StrUpperRule::new(["B"]).with_output_columns(["A"]);
        assert!(matches!(run_eager(&rule, sample()), Err(EtlError::ColumnAlreadyExists(_))));

        let out = run_eager(&rule.with_strict(false), sample())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["X", "Y", "Z"]));
        Ok(())
    }

    #[test]
    fn test_missing_column_strict() {
        let rule = StrLowerRule::new(["A", "Z"]);
        assert!(matches!(run_eager(&rule, sample()), Err(EtlError::MissingColumn(_))));
    }

    #[test]
    fn test_missing_column_ignored_when_not_strict() -> Result<()> {
        let rule = StrLowerRule::new(["A", "Z"]).with_strict(false);
        let out = run_eager(&rule, sample())?;
        assert_eq!(names(&out), vec!["A", "B"]);
        assert_eq!(strs(&out, "A"), owned_strs(&["  abc ", "def", "ghi  "]));

        let rule = StrUpperRule::new(["Z", "B"])
            .with_output_columns(["Z2", "B2"])
            .with_strict(false);
        let out = run_lazy(&rule, sample())?;
        assert_eq!(names(&out), vec!["A", "B", "B2"]);
        assert_eq!(strs(&out, "B2"), owned_strs(&["X", "Y", "Z"]));
        Ok(())
    }

    #[test]
    fn test_strip() -> Result<()> {
        let out = run_eager(&StrStripRule::new(["A"], Side::Both), sample())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["aBc", "Def", "gHI"]));

        let out = run_lazy(&StrStripRule::new(["A"], Side::Left), sample())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["aBc ", "Def", "gHI  "]));

        let out = run_eager(&StrStripRule::new(["A"], Side::Right), sample())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["  aBc", "Def", "gHI"]));

        let df = df!("A" => ["xxaxx", "ax"])?;
        let out = run_eager(&StrStripRule::new(["A"], Side::Both).with_characters("x"), df)?;
        assert_eq!(strs(&out, "A"), owned_strs(&["a", "a"]));
        Ok(())
    }

    #[test]
    fn test_pad() -> Result<()> {
        let df = df!("A" => ["1", "22", "4444"])?;
        let out = run_eager(&StrPadRule::new(["A"], 3, "0", Side::Left)?, df.clone())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["001", "022", "4444"]));

        let out = run_lazy(&StrPadRule::new(["A"], 3, ".", Side::Right)?, df)?;
        assert_eq!(strs(&out, "A"), owned_strs(&["1..", "22.", "4444"]));
        Ok(())
    }

    #[test]
    fn test_pad_invalid() {
        assert!(StrPadRule::new(["A"], 3, "00", Side::Left).is_err());
        assert!(StrPadRule::new(["A"], 3, "0", Side::Both).is_err());
    }

    #[test]
    fn test_replace_literal_and_regex() -> Result<()> {
        let df = df!("A" => ["a.b.c", "abc"])?;
        let rule = StrReplaceRule::new(["A"], ["."], ["-"], false)?;
        let out = run_eager(&rule, df.clone())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["a-b-c", "abc"]));

        let rule = StrReplaceRule::new(["A"], [r"([a-z])\.([a-z])"], ["${2}${1}"], true)?;
        let out = run_lazy(&rule, df)?;
        assert_eq!(strs(&out, "A"), owned_strs(&["ba.c", "abc"]));
        Ok(())
    }

    #[test]
    fn test_replace_invalid() {
        assert!(matches!(
            StrReplaceRule::new(["A"], ["a", "b"], ["c"], false),
            Err(EtlError::InvalidRule(_))
        ));
        assert!(matches!(
            StrReplaceRule::new(["A"], ["(unclosed"], ["c"], true),
            Err(EtlError::ExpressionSyntax(_))
        ));
    }

    fn lists(df: &DataFrame, name: &str) -> Vec<Vec<String>> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .list()
            .unwrap()
            .into_iter()
            .map(|items| {
                let items = items.unwrap();
                items.str().unwrap().into_iter().map(|v| v.unwrap().to_owned()).collect()
            })
            .collect()
    }

    fn split_sample() -> DataFrame {
        df!("A" => ["A,B;C,D;E", "1,2,3,4", "1;2;3;4"]).unwrap()
    }

    #[test]
    fn test_split() -> Result<()> {
        let out = run_eager(&StrSplitRule::new(["A"], ",")?, split_sample())?;
        assert_eq!(
            lists(&out, "A"),
            vec![vec!["A", "B;C", "D;E"], vec!["1", "2", "3", "4"], vec!["1;2;3;4"]]
        );

        let rule = StrSplitRule::new(["A"], ",")?.with_limit(2)?.with_output_columns(["L"]);
        let out = run_lazy(&rule, split_sample())?;
        assert_eq!(names(&out), vec!["A", "L"]);
        assert_eq!(lists(&out, "L"), vec![vec!["A", "B;C", "D;E"], vec!["1", "2", "3,4"], vec!["1;2;3;4"]]);
        Ok(())
    }

    #[test]
    fn test_split_regex() -> Result<()> {
        let out = run_lazy(&StrSplitRule::new_regex(["A"], ",|;")?, split_sample())?;
        assert_eq!(
            lists(&out, "A"),
            vec![vec!["A", "B", "C", "D", "E"], vec!["1", "2", "3", "4"], vec!["1", "2", "3", "4"]]
        );

        let rule = StrSplitRule::new_regex(["A"], ",|;")?.with_limit(2)?;
        let out = run_eager(&rule, split_sample())?;
        assert_eq!(
            lists(&out, "A"),
            vec![vec!["A", "B", "C,D;E"], vec!["1", "2", "3,4"], vec!["1", "2", "3;4"]]
        );
        Ok(())
    }

    #[test]
    fn test_split_invalid() {
        assert!(matches!(StrSplitRule::new(["A"], ""), Err(EtlError::InvalidRule(_))));
        assert!(matches!(StrSplitRule::new_regex(["A"], "(,"), Err(EtlError::ExpressionSyntax(_))));
        assert!(StrSplitRule::new(["A"], ",").unwrap().with_limit(0).is_err());

        let both: std::result::Result<StrSplitRule, _> =
            serde_json::from_value(serde_json::json!({"columns": ["A"], "separator": ",", "separator_regex": ";"}));
        assert!(both.unwrap().prepare().is_err());
    }

    #[test]
    fn test_split_rejoin() -> Result<()> {
        let df = df!("A" => ["b,c,a", "z"])?;
        let rule = StrSplitRejoinRule::new(["A"], ",")?.with_new_separator("|");
        let out = run_eager(&rule, df.clone())?;
        assert_eq!(strs(&out, "A"), owned_strs(&["b|c|a", "z"]));

        let rule = StrSplitRejoinRule::new(["A"], ",")?
            .with_sort(SortOrder::Descending)
            .with_output_columns(["S"]);
        let out = run_lazy(&rule, df.clone())?;
        assert_eq!(strs(&out, "S"), owned_strs(&["c,b,a", "z"]));

        let rule = StrSplitRejoinRule::new_regex(["A"], "[,]")?.with_sort(SortOrder::Ascending);
        let out = run_lazy(&rule, df)?;
        assert_eq!(strs(&out, "A"), owned_strs(&["a,b,c", "z"]));
        Ok(())
    }

    #[test]
    fn test_extract_single_group() -> Result<()> {
        let df = df!("A" => ["id-12", "id-7", "none"])?;
        let rule = StrExtractRule::new("A", r"id-(\d+)")?;
        let out = run_eager(&rule, df.clone())?;
        assert_eq!(strs(&out, "A"), vec![Some("12".to_owned()), Some("7".to_owned()), None]);

        let out = run_lazy(&rule.with_keep_original_value(true), df)?;
        assert_eq!(strs(&out, "A"), owned_strs(&["12", "7", "none"]));
        Ok(())
    }

    #[test]
    fn test_extract_groups_to_new_columns() -> Result<()> {
        let df = df!("A" => ["ab-12", "cd-7", "--"])?;
        let rule = StrExtractRule::new_to_columns("A", r"([a-z]+)-(\d+)", ["L", "N"])?;
        let out = run_lazy(&rule, df.clone())?;
        assert_eq!(names(&out), vec!["A", "L", "N"]);
        assert_eq!(strs(&out, "L"), vec![Some("ab".to_owned()), Some("cd".to_owned()), None]);
        assert_eq!(strs(&out, "N"), vec![Some("12".to_owned()), Some("7".to_owned()), None]);

        let out = run_eager(&rule.clone().with_keep_original_value(true), df.clone())?;
        assert_eq!(strs(&out, "L"), owned_strs(&["ab", "cd", "--"]));
        assert_eq!(strs(&out, "N"), vec![Some("12".to_owned()), Some("7".to_owned()), None]);

        let clash = StrExtractRule::new_to_columns("A", r"([a-z]+)-(\d+)", ["L", "A"])?;
        assert!(matches!(run_eager(&clash, df), Err(EtlError::ColumnAlreadyExists(_))));
        Ok(())
    }

    #[test]
    fn test_extract_invalid_and_missing() -> Result<()> {
        assert!(matches!(StrExtractRule::new("A", "(a)(b)"), Err(EtlError::InvalidRule(_))));
        assert!(matches!(StrExtractRule::new("A", "no groups"), Err(EtlError::InvalidRule(_))));
        assert!(matches!(
            StrExtractRule::new_to_columns("A", "(a)(b)", ["X"]),
            Err(EtlError::InvalidRule(_))
        ));
        assert!(matches!(StrExtractRule::new("A", "(a"), Err(EtlError::ExpressionSyntax(_))));

        let df = df!("A" => ["a"])?;
        let missing = StrExtractRule::new("Z", "(a)")?;
        assert!(matches!(run_eager(&missing, df.clone()), Err(EtlError::MissingColumn(_))));
        let out = run_lazy(&missing.with_strict(false), df)?;
        assert_eq!(names(&out), vec!["A"]);
        Ok(())
    }

    #[test]
    fn test_round_trips() {
        assert_round_trip(&StrLowerRule::new(["A"]).with_output_columns(["B"]));
        assert_round_trip(&StrUpperRule::new(["A"]));
        assert_round_trip(&StrCapitalizeRule::new(["A"]).with_strict(false));
        assert_round_trip(&StrStripRule::new(["A"], Side::Left).with_characters("-"));
        assert_round_trip(&StrPadRule::new(["A"], 5, "0", Side::Left).unwrap());
        assert_round_trip(&StrReplaceRule::new(["A"], ["a"], ["b"], true).unwrap());
        assert_round_trip(&StrSplitRule::new(["A"], ",").unwrap().with_limit(3).unwrap());
        assert_round_trip(&StrSplitRule::new_regex(["A"], "[,;]").unwrap().with_output_columns(["B"]));
        assert_round_trip(
            &StrSplitRejoinRule::new(["A"], ",")
                .unwrap()
                .with_new_separator(";")
                .with_sort(SortOrder::Ascending),
        );
        assert_round_trip(&StrExtractRule::new("A", "(a+)").unwrap().with_keep_original_value(true));
        assert_round_trip(&StrExtractRule::new_to_columns("A", "(a)(b)", ["X", "Y"]).unwrap());
    }
}
