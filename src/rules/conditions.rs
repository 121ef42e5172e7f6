//! Row filtering and conditional columns driven by SQL expressions.

use super::expressions::{ExprCache, ScalarValue, check_against};
use super::validation::{check_columns, check_new_columns};
use super::{FrameRule, frame_rule_io, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::slice;

/// Keeps the rows matching `condition_expression`.
///
/// With `discard_matching_rows` the matching rows are dropped instead. The
/// rows that were not kept can be routed to `named_output_discarded`. Rows
/// where the condition is null count as not matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub condition_expression: String,
    #[serde(default)]
    pub discard_matching_rows: bool,
    #[serde(default)]
    pub named_output_discarded: Option<String>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
    #[serde(skip)]
    compiled: ExprCache,
}

impl FilterRule {
    /// # Errors
    ///
    /// [`EtlError::ExpressionSyntax`] for an invalid condition.
    pub fn new(condition_expression: impl Into<String>) -> Result<Self> {
        let mut rule = Self {
            condition_expression: condition_expression.into(),
            discard_matching_rows: false,
            named_output_discarded: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
            compiled: ExprCache::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    #[must_use]
    pub fn with_discard_matching_rows(mut self, discard: bool) -> Self {
        self.discard_matching_rows = discard;
        self
    }

    #[must_use]
    pub fn with_named_output_discarded(mut self, name: impl Into<String>) -> Self {
        self.named_output_discarded = Some(name.into());
        self
    }
}

rule_builders!(FilterRule, unary);

impl FrameRule for FilterRule {
    frame_rule_io!(unary, "FilterRule");

    fn extra_outputs(&self) -> Vec<&str> {
        self.named_output_discarded.as_deref().into_iter().collect()
    }

    fn prepare(&mut self) -> Result<()> {
        self.compiled.compile(&self.condition_expression)
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let input = data.input_cloned(self.named_input.as_deref())?;
        let lf = input.into_lazy();
        let condition = self.compiled.get(&self.condition_expression)?.fill_null(lit(false));
        check_against(&lf, &condition)?;

        let (kept, discarded) = if self.discard_matching_rows {
            (condition.clone().not(), condition)
        } else {
            (condition.clone(), condition.not())
        };
        if let Some(name) = &self.named_output_discarded {
            let discarded = F::from_lazy(lf.clone().filter(discarded))?;
            data.set_named_output(name.as_str(), discarded);
        }
        data.set_output(self.named_output.as_deref(), F::from_lazy(lf.filter(kept))?);
        Ok(())
    }
}

/// Where one branch of an [`IfThenElseRule`] takes its value from.
#[derive(Debug, Clone, PartialEq)]
enum Branch<'a> {
    Value(&'a ScalarValue),
    Column(&'a str),
}

impl Branch<'_> {
    fn expr(&self) -> Expr {
        match self {
            Self::Value(value) => value.to_lit(),
            Self::Column(column) => col(*column),
        }
    }
}

fn branch<'a>(
    kind: &str,
    which: &str,
    value: Option<&'a ScalarValue>,
    column: Option<&'a str>,
) -> Result<Branch<'a>> {
    match (value, column) {
        (Some(value), None) => Ok(Branch::Value(value)),
        (None, Some(column)) => Ok(Branch::Column(column)),
        _ => Err(EtlError::InvalidRule(format!(
            "{kind}: one and only one of {which}_value and {which}_column can be specified"
        ))),
    }
}

/// Sets `output_column` to the then branch where `condition_expression`
/// holds and to the else branch elsewhere.
///
/// Each branch is either a literal (`*_value`) or another column
/// (`*_column`), never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfThenElseRule {
    pub condition_expression: String,
    pub output_column: String,
    #[serde(default)]
    pub then_value: Option<ScalarValue>,
    #[serde(default)]
    pub then_column: Option<String>,
    #[serde(default)]
    pub else_value: Option<ScalarValue>,
    #[serde(default)]
    pub else_column: Option<String>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
    #[serde(skip)]
    compiled: ExprCache,
}

impl IfThenElseRule {
    /// Start a rule with a literal in both branches.
    ///
    /// # Errors
    ///
    /// [`EtlError::ExpressionSyntax`] for an invalid condition and
    /// [`EtlError::InvalidRule`] for an empty output column.
    pub fn new(
        condition_expression: impl Into<String>,
        output_column: impl Into<String>,
        then_value: impl Into<ScalarValue>,
        else_value: impl Into<ScalarValue>,
    ) -> Result<Self> {
        let mut rule = Self {
            condition_expression: condition_expression.into(),
            output_column: output_column.into(),
            then_value: Some(then_value.into()),
            then_column: None,
            else_value: Some(else_value.into()),
            else_column: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
            compiled: ExprCache::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    /// Take the then branch from `column` instead of a literal.
    #[must_use]
    pub fn with_then_column(mut self, column: impl Into<String>) -> Self {
        self.then_value = None;
        self.then_column = Some(column.into());
        self
    }

    /// Take the else branch from `column` instead of a literal.
    #[must_use]
    pub fn with_else_column(mut self, column: impl Into<String>) -> Self {
        self.else_value = None;
        self.else_column = Some(column.into());
        self
    }

    fn branches(&self) -> Result<(Branch<'_>, Branch<'_>)> {
        Ok((
            branch(Self::KIND, "then", self.then_value.as_ref(), self.then_column.as_deref())?,
            branch(Self::KIND, "else", self.else_value.as_ref(), self.else_column.as_deref())?,
        ))
    }
}

rule_builders!(IfThenElseRule, unary);

impl FrameRule for IfThenElseRule {
    frame_rule_io!(unary, "IfThenElseRule");

    fn prepare(&mut self) -> Result<()> {
        if self.output_column.is_empty() {
            return Err(EtlError::InvalidRule("IfThenElseRule: output_column cannot be empty".to_owned()));
        }
        self.branches()?;
        self.compiled.compile(&self.condition_expression)
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let (then, otherwise) = self.branches()?;
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            if self.meta.strict {
                check_new_columns(available, slice::from_ref(&self.output_column))?;
            }
            let branch_columns: Vec<String> = [&then, &otherwise]
                .into_iter()
                .filter_map(|b| match b {
                    Branch::Column(column) => Some((*column).to_owned()),
                    Branch::Value(_) => None,
                })
                .collect();
            check_columns(available, &branch_columns, "Missing then/else columns")?;

            let condition = self.compiled.get(&self.condition_expression)?.fill_null(lit(false));
            check_against(&lf, &condition)?;
            let expr = when(condition)
                .then(then.expr())
                .otherwise(otherwise.expr())
                .alias(self.output_column.as_str());
            Ok(lf.with_column(expr))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use crate::rules::test_utils::{assert_round_trip, ints, names, run_eager, run_lazy, strs};

    fn sample() -> DataFrame {
        df!("A" => [1, 5, 3, 7], "B" => ["a", "b", "c", "d"]).unwrap()
    }

    #[test]
    fn test_filter_keeps_matching() -> Result<()> {
        let rule = FilterRule::new("A > 2")?;
        let out = run_eager(&rule, sample())?;
        assert_eq!(ints(&out, "A"), vec![Some(5), Some(3), Some(7)]);

        let out = run_lazy(&rule.with_discard_matching_rows(true), sample())?;
        assert_eq!(ints(&out, "A"), vec![Some(1)]);
        Ok(())
    }

    #[test]
    fn test_filter_discarded_output() -> Result<()> {
        let rule = FilterRule::new("B = 'b' OR B = 'd'")?.with_named_output_discarded("rest");
        let mut data = RuleData::new().with_main_input(sample());
        Rule::<DataFrame>::apply(&rule, &mut data)?;
        let rest = data.get_named_output("rest")?.clone();
        let kept = data.take_main_output().ok_or(EtlError::MissingMainInput)?;
        assert_eq!(ints(&kept, "A"), vec![Some(5), Some(7)]);
        assert_eq!(ints(&rest, "A"), vec![Some(1), Some(3)]);
        Ok(())
    }

    #[test]
    fn test_filter_null_condition_is_false() -> Result<()> {
        let df = df!("A" => [Some(1), None, Some(3)])?;
        let rule = FilterRule::new("A > 0")?.with_named_output_discarded("rest");
        let mut data = RuleData::new().with_main_input(df);
        Rule::<DataFrame>::apply(&rule, &mut data)?;
        assert_eq!(data.get_named_output("rest")?.height(), 1);
        assert_eq!(data.get_main_output().map(DataFrame::height), Some(2));
        Ok(())
    }

    #[test]
    fn test_filter_outputs() {
        let rule = FilterRule::new("A > 2")
            .unwrap()
            .with_named_output("big")
            .with_named_output_discarded("small");
        let boxed: Box<dyn Rule<DataFrame>> = Box::new(rule);
        assert_eq!(boxed.named_outputs(), vec!["big", "small"]);
    }

    #[test]
    fn test_if_then_else_values() -> Result<()> {
        let rule = IfThenElseRule::new("A > 2", "Size", "big", "small")?;
        let out = run_eager(&rule, sample())?;
        assert_eq!(names(&out), vec!["A", "B", "Size"]);
        assert_eq!(
            strs(&out, "Size"),
            ["small", "big", "big", "big"].map(|s| Some(s.to_owned())).to_vec()
        );
        Ok(())
    }

    #[test]
    fn test_if_then_else_columns() -> Result<()> {
        let rule = IfThenElseRule::new("A > 4", "C", 0_i64, 0_i64)?
            .with_then_column("A")
            .with_strict(true);
        let out = run_lazy(&rule, sample())?;
        assert_eq!(ints(&out, "C"), vec![Some(0), Some(5), Some(0), Some(7)]);

        let missing = IfThenElseRule::new("A > 4", "C", 0_i64, 0_i64)?.with_else_column("Z");
        assert!(matches!(run_eager(&missing, sample()), Err(EtlError::MissingColumn(_))));
        Ok(())
    }

    #[test]
    fn test_if_then_else_existing_output() -> Result<()> {
        let rule = IfThenElseRule::new("A > 2", "B", "x", "y")?;
        assert!(matches!(run_eager(&rule, sample()), Err(EtlError::ColumnAlreadyExists(_))));
        let out = run_eager(&rule.with_strict(false), sample())?;
        assert_eq!(strs(&out, "B")[0], Some("y".to_owned()));
        Ok(())
    }

    #[test]
    fn test_if_then_else_branch_validation() {
        let dct = serde_json::json!({"IfThenElseRule": {
            "condition_expression": "A > 1",
            "output_column": "C",
            "then_value": 1,
            "then_column": "A",
            "else_value": 0,
        }});
        assert!(matches!(DataFrame::backend().build(&dct), Err(EtlError::InvalidRule(_))));

        let dct = serde_json::json!({"IfThenElseRule": {
            "condition_expression": "A > 1",
            "output_column": "C",
            "then_value": 1,
        }});
        assert!(matches!(DataFrame::backend().build(&dct), Err(EtlError::InvalidRule(_))));
    }

    #[test]
    fn test_round_trips() {
        assert_round_trip(
            &FilterRule::new("A > 1")
                .unwrap()
                .with_discard_matching_rows(true)
                .with_named_output_discarded("rest"),
        );
        assert_round_trip(&IfThenElseRule::new("A > 1", "C", 1.5, true).unwrap());
        assert_round_trip(
            &IfThenElseRule::new("A > 1", "C", "x", 0_i64)
                .unwrap()
                .with_else_column("B"),
        );
    }
}
