//! Rounding and absolute values.

use super::validation::check_columns_if;
use super::{FrameRule, frame_rule_io, rule_builders, transform};
use crate::data::RuleData;
use crate::error::Result;
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rounds each column in `mapper` to the given number of decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRule {
    pub mapper: BTreeMap<String, u32>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl RoundRule {
    pub fn new<I, K>(mapper: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        Self {
            mapper: mapper.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }
}

rule_builders!(RoundRule, unary);

impl FrameRule for RoundRule {
    frame_rule_io!(unary, "RoundRule");

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns_if(self.meta.strict, available, self.mapper.keys(), "Missing columns to round")?;
            let exprs: Vec<Expr> = available
                .iter()
                .map(|name| match self.mapper.get(name) {
                    Some(decimals) => col(name.as_str()).round(*decimals),
                    None => col(name.as_str()),
                })
                .collect();
            Ok(lf.select(exprs))
        })
    }
}

/// Replaces numbers in `columns` by their absolute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsRule {
    pub columns: Vec<String>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl AbsRule {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }
}

rule_builders!(AbsRule, unary);

impl FrameRule for AbsRule {
    frame_rule_io!(unary, "AbsRule");

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns_if(self.meta.strict, available, &self.columns, "Missing columns for abs")?;
            let exprs: Vec<Expr> = available
                .iter()
                .map(|name| {
                    if self.columns.contains(name) {
                        col(name.as_str()).abs()
                    } else {
                        col(name.as_str())
                    }
                })
                .collect();
            Ok(lf.select(exprs))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::rules::test_utils::{assert_round_trip, floats, ints, run_eager, run_lazy};

    #[test]
    fn test_round() -> Result<()> {
        let df = df!("A" => [1.234, 2.345], "B" => [1.25, 9.99])?;
        let rule = RoundRule::new([("A", 1)]);
        let out = run_eager(&rule, df.clone())?;
        assert_eq!(floats(&out, "A"), vec![Some(1.2), Some(2.3)]);
        assert_eq!(floats(&out, "B"), vec![Some(1.25), Some(9.99)]);

        let out = run_lazy(&RoundRule::new([("B", 0)]), df)?;
        assert_eq!(floats(&out, "B"), vec![Some(1.0), Some(10.0)]);
        Ok(())
    }

    #[test]
    fn test_abs() -> Result<()> {
        let df = df!("A" => [-1, 2, -3], "B" => [-1, -1, -1])?;
        let out = run_lazy(&AbsRule::new(["A"]), df)?;
        assert_eq!(ints(&out, "A"), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(ints(&out, "B"), vec![Some(-1), Some(-1), Some(-1)]);
        Ok(())
    }

    #[test]
    fn test_missing_columns() -> Result<()> {
        let df = df!("A" => [-1])?;
        assert!(matches!(run_eager(&AbsRule::new(["Z"]), df.clone()), Err(EtlError::MissingColumn(_))));
        let out = run_eager(&AbsRule::new(["Z"]).with_strict(false), df)?;
        assert_eq!(ints(&out, "A"), vec![Some(-1)]);
        Ok(())
    }

    #[test]
    fn test_round_trips() {
        assert_round_trip(&RoundRule::new([("A", 2), ("B", 0)]));
        assert_round_trip(&AbsRule::new(["A"]).with_named_output("abs"));
    }
}
