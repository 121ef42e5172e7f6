//! Date and time columns.

use super::validation::{check_columns, check_new_columns};
use super::{FrameRule, column_exprs, columns_in_out, frame_rule_io, per_column, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::slice;

/// A part of a datetime value.
///
/// Numeric components are `Int64`; `weekday` counts from Monday = 0. The
/// name components are English strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Microsecond,
    Weekday,
    DayName,
    MonthName,
}

impl Component {
    fn extract(self, e: Expr) -> Expr {
        let dt = e.dt();
        let numeric = match self {
            Self::Year => dt.year(),
            Self::Month => dt.month(),
            Self::Day => dt.day(),
            Self::Hour => dt.hour(),
            Self::Minute => dt.minute(),
            Self::Second => dt.second(),
            Self::Microsecond => dt.microsecond(),
            Self::Weekday => return dt.weekday().cast(DataType::Int64) - lit(1_i64),
            Self::DayName => return dt.strftime("%A"),
            Self::MonthName => return dt.strftime("%B"),
        };
        numeric.cast(DataType::Int64)
    }
}

/// Extracts `component` from datetime `columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeExtractComponentRule {
    pub columns: Vec<String>,
    pub component: Component,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl DateTimeExtractComponentRule {
    pub fn new<I, S>(columns: I, component: Component) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            component,
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
        self.output_columns = Some(output_columns.into_iter().map(Into::into).collect());
        self
    }
}

rule_builders!(DateTimeExtractComponentRule, unary);

impl FrameRule for DateTimeExtractComponentRule {
    frame_rule_io!(unary, "DateTimeExtractComponentRule");

    fn prepare(&mut self) -> Result<()> {
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let component = self.component;
        per_column(data, &columns_in_out!(self), |e| component.extract(e))
    }
}

/// Formats datetime `columns` as strings using a strftime `format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeToStrFormatRule {
    pub columns: Vec<String>,
    pub format: String,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl DateTimeToStrFormatRule {
    pub fn new<I, S>(columns: I, format: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            format: format.into(),
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
        self.output_columns = Some(output_columns.into_iter().map(Into::into).collect());
        self
    }
}

rule_builders!(DateTimeToStrFormatRule, unary);

impl FrameRule for DateTimeToStrFormatRule {
    frame_rule_io!(unary, "DateTimeToStrFormatRule");

    fn prepare(&mut self) -> Result<()> {
        if self.format.is_empty() {
            return Err(EtlError::InvalidRule("DateTimeToStrFormatRule: format cannot be empty".to_owned()));
        }
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        per_column(data, &columns_in_out!(self), |e| e.dt().strftime(&self.format))
    }
}

/// Adds `output_column` holding the time the rule ran.
fn add_now<F: Frame>(
    data: &mut RuleData<F>,
    named_input: Option<&str>,
    named_output: Option<&str>,
    strict: bool,
    output_column: &str,
    now: chrono::NaiveDateTime,
) -> Result<()> {
    transform(data, named_input, named_output, |lf, available| {
        if strict {
            check_new_columns(available, slice::from_ref(&output_column.to_owned()))?;
        }
        Ok(lf.with_column(lit(now).alias(output_column)))
    })
}

macro_rules! now_rule {
    ($(#[$doc:meta])* $name:ident, $kind:literal, $now:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub output_column: String,
            #[serde(default)]
            pub named_input: Option<String>,
            #[serde(default)]
            pub named_output: Option<String>,
            #[serde(flatten)]
            pub meta: RuleMeta,
        }

        impl $name {
            pub fn new(output_column: impl Into<String>) -> Self {
                Self {
                    output_column: output_column.into(),
                    named_input: None,
                    named_output: None,
                    meta: RuleMeta::default(),
                }
            }
        }

        rule_builders!($name, unary);

        impl FrameRule for $name {
            frame_rule_io!(unary, $kind);

            fn prepare(&mut self) -> Result<()> {
                if self.output_column.is_empty() {
                    return Err(EtlError::InvalidRule(format!("{}: output_column cannot be empty", $kind)));
                }
                Ok(())
            }

            fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
                add_now(
                    data,
                    self.named_input.as_deref(),
                    self.named_output.as_deref(),
                    self.meta.strict,
                    &self.output_column,
                    $now,
                )
            }
        }
    };
}

now_rule!(
    /// Adds a column with the current UTC time.
    DateTimeUTCNowRule,
    "DateTimeUTCNowRule",
    chrono::Utc::now().naive_utc()
);

now_rule!(
    /// Adds a column with the current local time.
    DateTimeLocalNowRule,
    "DateTimeLocalNowRule",
    chrono::Local::now().naive_local()
);

/// The names extracted by [`DateTimeExtractComponentNamesRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameComponent {
    DayName,
    MonthName,
}

/// Only the C and English locales have names available.
fn check_locale(locale: &str) -> Result<()> {
    let language = locale.split(['.', '@']).next().unwrap_or_default();
    let english = matches!(language, "C" | "POSIX" | "en") || language.starts_with("en_");
    if english {
        Ok(())
    } else {
        Err(EtlError::InvalidRule(format!("Unsupported locale: {locale}")))
    }
}

/// Extracts weekday or month names from datetime `columns`.
///
/// `locale` is checked when the rule is built; names are rendered in
/// English.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeExtractComponentNamesRule {
    pub columns: Vec<String>,
    pub component: NameComponent,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl DateTimeExtractComponentNamesRule {
    pub fn new<I, S>(columns: I, component: NameComponent) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            component,
            locale: None,
            output_columns: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] for a locale without names.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Result<Self> {
        self.locale = Some(locale.into());
        self.prepare()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_output_columns<I, S>(mut self, output_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_columns = Some(output_columns.into_iter().map(Into::into).collect());
        self
    }
}

rule_builders!(DateTimeExtractComponentNamesRule, unary);

impl FrameRule for DateTimeExtractComponentNamesRule {
    frame_rule_io!(unary, "DateTimeExtractComponentNamesRule");

    fn prepare(&mut self) -> Result<()> {
        if let Some(locale) = &self.locale {
            check_locale(locale)?;
        }
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let format = match self.component {
            NameComponent::DayName => "%A",
            NameComponent::MonthName => "%B",
        };
        per_column(data, &columns_in_out!(self), |e| e.dt().strftime(format))
    }
}

/// The bucket size of the rounding rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundUnit {
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
}

impl RoundUnit {
    fn every(self) -> &'static str {
        match self {
            Self::Day => "1d",
            Self::Hour => "1h",
            Self::Minute => "1m",
            Self::Second => "1s",
            Self::Millisecond => "1ms",
            Self::Microsecond => "1us",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Rounding {
    Nearest,
    Down,
    Up,
}

impl Rounding {
    fn apply(self, e: Expr, unit: RoundUnit) -> Expr {
        let every = || lit(unit.every());
        match self {
            // halfway values go down
            Self::Nearest if unit == RoundUnit::Microsecond => e.dt().round(every()),
            Self::Nearest => e.dt().offset_by(lit("-1us")).dt().round(every()),
            Self::Down => e.dt().truncate(every()),
            Self::Up => e
                .dt()
                .offset_by(every())
                .dt()
                .offset_by(lit("-1us"))
                .dt()
                .truncate(every()),
        }
    }
}

macro_rules! round_rule {
    ($(#[$doc:meta])* $name:ident, $kind:literal, $rounding:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub columns: Vec<String>,
            pub unit: RoundUnit,
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
            pub fn new<I, S>(columns: I, unit: RoundUnit) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                Self {
                    columns: columns.into_iter().map(Into::into).collect(),
                    unit,
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
                self.output_columns = Some(output_columns.into_iter().map(Into::into).collect());
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
                let unit = self.unit;
                per_column(data, &columns_in_out!(self), |e| $rounding.apply(e, unit))
            }
        }
    };
}

round_rule!(
    /// Rounds datetimes to the nearest `unit`.
    DateTimeRoundRule,
    "DateTimeRoundRule",
    Rounding::Nearest
);

round_rule!(
    /// Truncates datetimes to the start of their `unit`.
    DateTimeRoundDownRule,
    "DateTimeRoundDownRule",
    Rounding::Down
);

round_rule!(
    /// Rounds datetimes up to the next whole `unit`; whole values are kept.
    DateTimeRoundUpRule,
    "DateTimeRoundUpRule",
    Rounding::Up
);

round_rule!(
    /// Same as [`DateTimeRoundDownRule`].
    DateTimeFloorRule,
    "DateTimeFloorRule",
    Rounding::Down
);

round_rule!(
    /// Same as [`DateTimeRoundUpRule`].
    DateTimeCeilingRule,
    "DateTimeCeilingRule",
    Rounding::Up
);

/// The unit of `unit_value` in date arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    Years,
    Months,
    Weeks,
    Days,
    Weekdays,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
    Microseconds,
}

impl DateUnit {
    fn suffix(self) -> &'static str {
        match self {
            Self::Years => "y",
            Self::Months => "mo",
            Self::Weeks => "w",
            Self::Days | Self::Weekdays => "d",
            Self::Hours => "h",
            Self::Minutes => "m",
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
            Self::Microseconds => "us",
        }
    }
}

/// How much to add: a constant, or the values of another column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitValue {
    Int(i64),
    Column(String),
}

impl From<i64> for UnitValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for UnitValue {
    fn from(v: &str) -> Self {
        Self::Column(v.to_owned())
    }
}

/// Move `e` by `n` working days, Monday to Friday.
///
/// Weekend values first move to the Friday before when going forward, or
/// the Monday after otherwise.
fn weekdays_offset(e: Expr, n: Expr) -> Expr {
    let weekday = e.clone().dt().weekday().cast(DataType::Int64) - lit(1_i64);
    let forward = n.clone().gt(lit(0_i64));
    let to_weekday = when(weekday.clone().eq(lit(5_i64)))
        .then(when(forward.clone()).then(lit(-1_i64)).otherwise(lit(2_i64)))
        .when(weekday.clone().eq(lit(6_i64)))
        .then(when(forward).then(lit(-2_i64)).otherwise(lit(1_i64)))
        .otherwise(lit(0_i64));
    let start = weekday + to_weekday.clone();
    let start = start.clone() - lit(7_i64) * start.floor_div(lit(7_i64));
    let days = to_weekday + n.clone() + lit(2_i64) * (start + n).floor_div(lit(5_i64));
    e.dt()
        .offset_by(concat_str([days.cast(DataType::String), lit("d")], "", false))
}

/// A resolved `unit_value`, ready to apply to any datetime column.
enum Shift {
    /// polars offset strings such as `3mo`
    Offset(Expr),
    Weekdays(Expr),
    Plus(Expr),
    Minus(Expr),
}

impl Shift {
    /// # Errors
    ///
    /// [`EtlError::MissingColumn`] for an unknown value column and
    /// [`EtlError::UnsupportedType`] for one that cannot be added.
    fn resolve(value: &UnitValue, unit: DateUnit, sign: i64, schema: &Schema) -> Result<Self> {
        let other = match value {
            UnitValue::Int(n) if unit == DateUnit::Weekdays => return Ok(Self::Weekdays(lit(sign * n))),
            UnitValue::Int(n) => return Ok(Self::Offset(lit(format!("{}{}", sign * n, unit.suffix())))),
            UnitValue::Column(other) => other.as_str(),
        };
        let Some(dtype) = schema.get(other) else {
            return Err(EtlError::MissingColumn(format!("unit_value column {other:?}")));
        };
        match dtype {
            DataType::Datetime(..) | DataType::Date | DataType::Duration(_) if sign < 0 => Ok(Self::Minus(col(other))),
            DataType::Duration(_) => Ok(Self::Plus(col(other))),
            dtype if dtype.is_integer() => {
                let n = col(other).cast(DataType::Int64).fill_null(lit(0_i64)) * lit(sign);
                if unit == DateUnit::Weekdays {
                    return Ok(Self::Weekdays(n));
                }
                Ok(Self::Offset(concat_str([n.cast(DataType::String), lit(unit.suffix())], "", false)))
            }
            dtype => Err(EtlError::UnsupportedType(format!(
                "cannot {} column {other:?} of type {dtype}",
                if sign < 0 { "substract" } else { "add" }
            ))),
        }
    }

    fn apply(&self, e: Expr) -> Expr {
        match self {
            Self::Offset(by) => e.dt().offset_by(by.clone()),
            Self::Weekdays(n) => weekdays_offset(e, n.clone()),
            Self::Plus(other) => e + other.clone(),
            Self::Minus(other) => e - other.clone(),
        }
    }
}

macro_rules! shift_rule {
    ($(#[$doc:meta])* $name:ident, $kind:literal, $sign:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub columns: Vec<String>,
            pub unit_value: UnitValue,
            pub unit: DateUnit,
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
            pub fn new<I, S>(columns: I, unit_value: impl Into<UnitValue>, unit: DateUnit) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                Self {
                    columns: columns.into_iter().map(Into::into).collect(),
                    unit_value: unit_value.into(),
                    unit,
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
                self.output_columns = Some(output_columns.into_iter().map(Into::into).collect());
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
                let io = columns_in_out!(self);
                transform(data, io.named_input, io.named_output, |mut lf, available| {
                    let schema = lf.collect_schema()?;
                    let shift = Shift::resolve(&self.unit_value, self.unit, $sign, &schema)?;
                    let exprs = column_exprs(&io, available, |e| shift.apply(e))?;
                    Ok(lf.with_columns(exprs))
                })
            }
        }
    };
}

shift_rule!(
    /// Adds `unit_value` units to datetime `columns`.
    ///
    /// `unit_value` is a constant or the name of an integer or duration
    /// column. Months and years keep the day of the month where it exists and
    /// clamp it to the month end otherwise.
    DateTimeAddRule,
    "DateTimeAddRule",
    1
);

shift_rule!(
    /// Substracts `unit_value` units from datetime `columns`.
    ///
    /// Besides what [`DateTimeAddRule`] accepts, `unit_value` may name another
    /// datetime column, giving the durations between the two.
    DateTimeSubstractRule,
    "DateTimeSubstractRule",
    -1
);

/// What [`DateTimeDiffRule`] reports of each duration.
///
/// `days` and `total_seconds` are whole totals; the others are the
/// remainder within the next bigger unit (hours of the day, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
    Microseconds,
    TotalSeconds,
}

impl DiffUnit {
    fn apply(self, duration: Expr) -> Expr {
        let dt = duration.dt();
        match self {
            Self::Days => dt.total_days(),
            Self::Hours => dt.total_hours() % lit(24_i64),
            Self::Minutes => dt.total_minutes() % lit(60_i64),
            Self::Seconds => dt.total_seconds() % lit(60_i64),
            Self::Microseconds => dt.total_microseconds() % lit(1000_i64),
            Self::TotalSeconds => dt.total_seconds(),
        }
    }
}

/// `input_column - input_column2` for two datetime columns.
///
/// Without `unit` the result is a duration. Without `output_column` it
/// overwrites `input_column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeDiffRule {
    pub input_column: String,
    pub input_column2: String,
    #[serde(default)]
    pub unit: Option<DiffUnit>,
    #[serde(default)]
    pub output_column: Option<String>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl DateTimeDiffRule {
    pub fn new(input_column: impl Into<String>, input_column2: impl Into<String>) -> Self {
        Self {
            input_column: input_column.into(),
            input_column2: input_column2.into(),
            unit: None,
            output_column: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: DiffUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    #[must_use]
    pub fn with_output_column(mut self, output_column: impl Into<String>) -> Self {
        self.output_column = Some(output_column.into());
        self
    }
}

rule_builders!(DateTimeDiffRule, unary);

impl FrameRule for DateTimeDiffRule {
    frame_rule_io!(unary, "DateTimeDiffRule");

    fn prepare(&mut self) -> Result<()> {
        if self.input_column.is_empty() || self.input_column2.is_empty() {
            return Err(EtlError::InvalidRule(
                "DateTimeDiffRule: input_column and input_column2 cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |mut lf, available| {
            check_columns(available, slice::from_ref(&self.input_column2), "Missing input_column2")?;
            if !available.contains(&self.input_column) {
                if self.meta.strict {
                    check_columns(available, slice::from_ref(&self.input_column), "Missing input_column")?;
                }
                return Ok(lf);
            }
            let output = self.output_column.as_ref().unwrap_or(&self.input_column);
            if self.meta.strict && self.output_column.is_some() {
                check_new_columns(available, slice::from_ref(output))?;
            }
            let schema = lf.collect_schema()?;
            if let Some(dtype) = schema
                .get(&self.input_column2)
                .filter(|dtype| !matches!(dtype, DataType::Datetime(..) | DataType::Date))
            {
                return Err(EtlError::UnsupportedType(format!(
                    "input_column2 {:?} must be a datetime, got {dtype}",
                    self.input_column2
                )));
            }
            let duration = col(self.input_column.as_str()) - col(self.input_column2.as_str());
            let diff = match self.unit {
                Some(unit) => unit.apply(duration),
                None => duration,
            };
            Ok(lf.with_column(diff.alias(output.as_str())))
        })
    }
}
