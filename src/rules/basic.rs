//! Projection, renaming, sorting, de-duplication and value replacement.

use super::expressions::ScalarValue;
use super::validation::{check_columns, check_columns_if};
use super::{FrameRule, columns_in_out, frame_rule_io, per_column, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

fn owned<I, S>(columns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    columns.into_iter().map(Into::into).collect()
}

/// Keeps (or, with `exclude`, drops) a set of columns.
///
/// Kept columns come out in the order given. In strict mode every listed
/// column must exist; otherwise missing ones are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRule {
    pub columns: Vec<String>,
    #[serde(default)]
    pub exclude: bool,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl ProjectRule {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: owned(columns),
            exclude: false,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_exclude(mut self, exclude: bool) -> Self {
        self.exclude = exclude;
        self
    }
}

rule_builders!(ProjectRule, unary);

impl FrameRule for ProjectRule {
    frame_rule_io!(unary, "ProjectRule");

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns_if(self.meta.strict, available, &self.columns, "Missing columns to project")?;
            let selected: Vec<Expr> = if self.exclude {
                available
                    .iter()
                    .filter(|c| !self.columns.contains(c))
                    .map(|c| col(c.as_str()))
                    .collect()
            } else {
                self.columns
                    .iter()
                    .filter(|c| available.contains(c))
                    .map(|c| col(c.as_str()))
                    .collect()
            };
            Ok(lf.select(selected))
        })
    }
}

/// Renames columns according to `mapper` (old name to new name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRule {
    pub mapper: BTreeMap<String, String>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl RenameRule {
    pub fn new<I, K, V>(mapper: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            mapper: mapper
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }
}

rule_builders!(RenameRule, unary);

impl FrameRule for RenameRule {
    frame_rule_io!(unary, "RenameRule");

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns_if(self.meta.strict, available, self.mapper.keys(), "Missing columns to rename")?;
            let exprs: Vec<Expr> = available
                .iter()
                .map(|name| match self.mapper.get(name) {
                    Some(new_name) => col(name.as_str()).alias(new_name.as_str()),
                    None => col(name.as_str()),
                })
                .collect();
            Ok(lf.select(exprs))
        })
    }
}

/// Sort direction: one flag for every column, or one per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ascending {
    All(bool),
    PerColumn(Vec<bool>),
}

impl Default for Ascending {
    fn default() -> Self {
        Self::All(true)
    }
}

/// Sorts by one or more columns. Nulls sort last; ties keep input order.
///
/// Missing sort columns are an error regardless of `strict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortRule {
    pub sort_by: Vec<String>,
    #[serde(default)]
    pub ascending: Ascending,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl SortRule {
    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] if `sort_by` is empty.
    pub fn new<I, S>(sort_by: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = Self {
            sort_by: owned(sort_by),
            ascending: Ascending::default(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] if a per-column list does not match `sort_by`.
    pub fn with_ascending(mut self, ascending: Ascending) -> Result<Self> {
        self.ascending = ascending;
        self.prepare()?;
        Ok(self)
    }

    fn descending(&self) -> Vec<bool> {
        match &self.ascending {
            Ascending::All(asc) => vec![!asc; self.sort_by.len()],
            Ascending::PerColumn(flags) => flags.iter().map(|asc| !asc).collect(),
        }
    }
}

rule_builders!(SortRule, unary);

impl FrameRule for SortRule {
    frame_rule_io!(unary, "SortRule");

    fn prepare(&mut self) -> Result<()> {
        if self.sort_by.is_empty() {
            return Err(EtlError::InvalidRule("SortRule: sort_by cannot be empty".to_owned()));
        }
        if let Ascending::PerColumn(flags) = &self.ascending {
            if flags.len() != self.sort_by.len() {
                return Err(EtlError::InvalidRule(format!(
                    "SortRule: ascending has {} entries but sort_by has {}",
                    flags.len(),
                    self.sort_by.len()
                )));
            }
        }
        Ok(())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns(available, &self.sort_by, "Missing columns to sort by")?;
            let by: Vec<Expr> = self.sort_by.iter().map(|c| col(c.as_str())).collect();
            let options = SortMultipleOptions::default()
                .with_order_descending_multi(self.descending())
                .with_nulls_last(true)
                .with_maintain_order(true);
            Ok(lf.sort_by_exprs(by, options))
        })
    }
}

/// Which duplicate to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keep {
    #[default]
    First,
    Last,
    /// Drop every row that has a duplicate
    None,
}

/// Removes rows that repeat the values of `columns` (all columns if empty).
///
/// Missing columns are an error regardless of `strict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupeRule {
    pub columns: Vec<String>,
    #[serde(default)]
    pub keep: Keep,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl DedupeRule {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: owned(columns),
            keep: Keep::default(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_keep(mut self, keep: Keep) -> Self {
        self.keep = keep;
        self
    }
}

rule_builders!(DedupeRule, unary);

impl FrameRule for DedupeRule {
    frame_rule_io!(unary, "DedupeRule");

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns(available, &self.columns, "Missing columns to dedupe on")?;
            let subset = (!self.columns.is_empty()).then(|| {
                self.columns
                    .iter()
                    .map(|c| PlSmallStr::from(c.as_str()))
                    .collect::<Vec<_>>()
            });
            let keep = match self.keep {
                Keep::First => UniqueKeepStrategy::First,
                Keep::Last => UniqueKeepStrategy::Last,
                Keep::None => UniqueKeepStrategy::None,
            };
            Ok(lf.unique_stable(subset, keep))
        })
    }
}

static GROUP_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\g<(\w+)>|\\(\d+)").expect("group reference pattern is valid")
});

/// Rewrite `\1` and `\g<name>` group references as `${1}` and `${name}`.
fn replacement_template(new_value: &str) -> String {
    GROUP_REFERENCE
        .replace_all(new_value, |caps: &regex::Captures<'_>| {
            let group = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            format!("${{{group}}}")
        })
        .into_owned()
}

/// Replaces each of `values` with the matching entry of `new_values`.
///
/// Without `regex`, whole cell values are matched and each cell is compared
/// against the original value only, so replacements never chain. With
/// `regex`, values are patterns over strings and the first match in each
/// cell is replaced; replacements may refer to groups as `$1`, `${name}`,
/// `\1` or `\g<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceRule {
    pub columns: Vec<String>,
    pub values: Vec<ScalarValue>,
    pub new_values: Vec<ScalarValue>,
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

impl ReplaceRule {
    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] if the value lists differ in length or a
    /// regex value is not a string, and [`EtlError::ExpressionSyntax`] for
    /// an invalid pattern.
    pub fn new<I, S, V, N, X>(columns: I, values: V, new_values: N, regex: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        V: IntoIterator<Item = X>,
        N: IntoIterator<Item = X>,
        X: Into<ScalarValue>,
    {
        let mut rule = Self {
            columns: owned(columns),
            values: values.into_iter().map(Into::into).collect(),
            new_values: new_values.into_iter().map(Into::into).collect(),
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

    /// `(pattern, replacement)` pairs of a regex rule.
    fn patterns(&self) -> Result<Vec<(&str, String)>> {
        self.values
            .iter()
            .zip(&self.new_values)
            .map(|pair| match pair {
                (ScalarValue::Str(pattern), ScalarValue::Str(new_value)) => {
                    Regex::new(pattern).map_err(|e| {
                        EtlError::ExpressionSyntax(format!("Invalid pattern '{pattern}': {e}"))
                    })?;
                    Ok((pattern.as_str(), replacement_template(new_value)))
                }
                (value, new_value) => Err(EtlError::InvalidRule(format!(
                    "ReplaceRule: regex values must be strings, got {value:?} -> {new_value:?}"
                ))),
            })
            .collect()
    }
}

rule_builders!(ReplaceRule, unary);

impl FrameRule for ReplaceRule {
    frame_rule_io!(unary, "ReplaceRule");

    fn prepare(&mut self) -> Result<()> {
        if self.values.len() != self.new_values.len() {
            return Err(EtlError::InvalidRule(format!(
                "ReplaceRule: values and new_values must have the same length ({} != {})",
                self.values.len(),
                self.new_values.len()
            )));
        }
        if self.regex {
            self.patterns()?;
        }
        super::validation::pair_columns(Self::KIND, &self.columns, self.output_columns.as_deref())
            .map(|_| ())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        if self.regex {
            let patterns = self.patterns()?;
            return per_column(data, &columns_in_out!(self), |e| {
                patterns.iter().fold(e, |acc, (pattern, replacement)| {
                    acc.str().replace(lit(*pattern), lit(replacement.as_str()), false)
                })
            });
        }
        per_column(data, &columns_in_out!(self), |e| {
            self.values
                .iter()
                .zip(&self.new_values)
                .rev()
                .fold(e.clone(), |acc, (value, new_value)| {
                    when(e.clone().eq(value.to_lit()))
                        .then(new_value.to_lit())
                        .otherwise(acc)
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_utils::{assert_round_trip, ints, names, run_eager, run_lazy, strs};

    fn sample() -> DataFrame {
        df!(
            "A" => [2, 1, 3],
            "B" => ["n", "m", "p"],
            "C" => [true, false, true],
        )
        .unwrap()
    }

    #[test]
    fn test_project_keeps_given_order() -> Result<()> {
        let rule = ProjectRule::new(["B", "A"]);
        let out = run_eager(&rule, sample())?;
        assert_eq!(out, df!("B" => ["n", "m", "p"], "A" => [2, 1, 3])?);
        Ok(())
    }

    #[test]
    fn test_project_exclude() -> Result<()> {
        let rule = ProjectRule::new(["B"]).with_exclude(true);
        let out = run_lazy(&rule, sample())?;
        assert_eq!(names(&out), vec!["A", "C"]);
        Ok(())
    }

    #[test]
    fn test_project_missing_column() {
        let rule = ProjectRule::new(["A", "Z"]);
        assert!(matches!(run_eager(&rule, sample()), Err(EtlError::MissingColumn(_))));

        let rule = ProjectRule::new(["A", "Z"]).with_strict(false);
        let out = run_eager(&rule, sample()).unwrap();
        assert_eq!(names(&out), vec!["A"]);
    }

    #[test]
    fn test_rename() -> Result<()> {
        let rule = RenameRule::new([("A", "AA"), ("C", "CC")]);
        let out = run_lazy(&rule, sample())?;
        assert_eq!(names(&out), vec!["AA", "B", "CC"]);

        let rule = RenameRule::new([("Z", "ZZ")]);
        assert!(matches!(run_eager(&rule, sample()), Err(EtlError::MissingColumn(_))));
        let rule = RenameRule::new([("Z", "ZZ")]).with_strict(false);
        assert_eq!(run_eager(&rule, sample())?, sample());
        Ok(())
    }

    #[test]
    fn test_sort_ascending_and_descending() -> Result<()> {
        let rule = SortRule::new(["A"])?;
        let out = run_eager(&rule, sample())?;
        assert_eq!(ints(&out, "A"), vec![Some(1), Some(2), Some(3)]);

        let rule = SortRule::new(["A"])?.with_ascending(Ascending::All(false))?;
        let out = run_lazy(&rule, sample())?;
        assert_eq!(ints(&out, "A"), vec![Some(3), Some(2), Some(1)]);
        Ok(())
    }

    #[test]
    fn test_sort_multi_column() -> Result<()> {
        let df = df!("A" => [1, 1, 2], "B" => [1, 2, 3])?;
        let rule = SortRule::new(["A", "B"])?.with_ascending(Ascending::PerColumn(vec![true, false]))?;
        let out = run_eager(&rule, df)?;
        assert_eq!(ints(&out, "B"), vec![Some(2), Some(1), Some(3)]);
        Ok(())
    }

    #[test]
    fn test_sort_invalid() {
        assert!(SortRule::new(Vec::<String>::new()).is_err());
        assert!(
            SortRule::new(["A"])
                .unwrap()
                .with_ascending(Ascending::PerColumn(vec![true, false]))
                .is_err()
        );
        let rule = SortRule::new(["Z"]).unwrap().with_strict(false);
        assert!(matches!(run_eager(&rule, sample()), Err(EtlError::MissingColumn(_))));
    }

    #[test]
    fn test_dedupe_keep_strategies() -> Result<()> {
        let df = df!("A" => [1, 1, 2], "B" => ["x", "y", "z"])?;

        let out = run_eager(&DedupeRule::new(["A"]), df.clone())?;
        assert_eq!(strs(&out, "B"), vec![Some("x".to_owned()), Some("z".to_owned())]);

        let out = run_lazy(&DedupeRule::new(["A"]).with_keep(Keep::Last), df.clone())?;
        assert_eq!(strs(&out, "B"), vec![Some("y".to_owned()), Some("z".to_owned())]);

        let out = run_eager(&DedupeRule::new(["A"]).with_keep(Keep::None), df)?;
        assert_eq!(strs(&out, "B"), vec![Some("z".to_owned())]);
        Ok(())
    }

    #[test]
    fn test_dedupe_on_subset_and_whole_rows() -> Result<()> {
        let df = df!("A" => [1, 1, 1, 2], "B" => ["x", "x", "y", "x"])?;

        let out = run_lazy(&DedupeRule::new(["A", "B"]), df.clone())?;
        assert_eq!(ints(&out, "A"), vec![Some(1), Some(1), Some(2)]);
        assert_eq!(strs(&out, "B"), vec![Some("x".to_owned()), Some("y".to_owned()), Some("x".to_owned())]);

        let out = run_eager(&DedupeRule::new(Vec::<String>::new()).with_keep(Keep::Last), df)?;
        assert_eq!(out.height(), 3);
        Ok(())
    }

    #[test]
    fn test_dedupe_missing_column_ignores_strict() {
        let rule = DedupeRule::new(["Z"]).with_strict(false);
        assert!(matches!(run_eager(&rule, sample()), Err(EtlError::MissingColumn(_))));
    }

    #[test]
    fn test_replace_whole_values() -> Result<()> {
        let df = df!("S" => ["a", "b", "c", "ab"], "N" => [1, 2, 3, 1])?;
        let rule = ReplaceRule::new(["S"], ["a", "b"], ["b", "x"], false)?;
        let out = run_eager(&rule, df.clone())?;
        assert_eq!(
            strs(&out, "S"),
            vec![Some("b".to_owned()), Some("x".to_owned()), Some("c".to_owned()), Some("ab".to_owned())]
        );

        let rule = ReplaceRule::new(["N"], [1_i64], [100_i64], false)?.with_output_columns(["M"]);
        let out = run_lazy(&rule, df)?;
        assert_eq!(names(&out), vec!["S", "N", "M"]);
        assert_eq!(ints(&out, "M"), vec![Some(100), Some(2), Some(3), Some(100)]);
        Ok(())
    }

    #[test]
    fn test_replace_regex_first_match() -> Result<()> {
        let df = df!("S" => ["a-b c-d", "no match"])?;
        let rule = ReplaceRule::new(["S"], [r"(\w)-(\w)"], [r"\2-\g<1>"], true)?;
        let out = run_lazy(&rule, df)?;
        assert_eq!(strs(&out, "S"), vec![Some("b-a c-d".to_owned()), Some("no match".to_owned())]);
        Ok(())
    }

    #[test]
    fn test_replace_invalid() {
        assert!(matches!(
            ReplaceRule::new(["S"], ["a", "b"], ["c"], false),
            Err(EtlError::InvalidRule(_))
        ));
        assert!(matches!(
            ReplaceRule::new(["S"], [1_i64], [2_i64], true),
            Err(EtlError::InvalidRule(_))
        ));
        assert!(matches!(
            ReplaceRule::new(["S"], ["(open"], ["x"], true),
            Err(EtlError::ExpressionSyntax(_))
        ));
        assert_eq!(replacement_template(r"\1 and \g<name> and $2"), "${1} and ${name} and $2");
    }

    #[test]
    fn test_round_trips() {
        assert_round_trip(&ProjectRule::new(["A", "B"]).with_exclude(true).with_name("project"));
        assert_round_trip(&ReplaceRule::new(["A"], [1_i64, 2], [3_i64, 4], false).unwrap());
        assert_round_trip(&ReplaceRule::new(["A"], ["x+"], ["y"], true).unwrap().with_output_columns(["B"]));
        assert_round_trip(&RenameRule::new([("A", "B")]).with_named_input("x").with_named_output("y"));
        assert_round_trip(
            &SortRule::new(["A", "B"])
                .unwrap()
                .with_ascending(Ascending::PerColumn(vec![true, false]))
                .unwrap()
                .with_description("sort"),
        );
        assert_round_trip(&DedupeRule::new(["A"]).with_keep(Keep::None).with_strict(false));
    }
}
