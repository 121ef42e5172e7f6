//! Stacking two tables vertically or side by side.

use super::validation::{check_columns, missing_columns};
use super::{FrameRule, Operand, frame_rule_io, rule_builders, transform2};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn select(lf: LazyFrame, columns: &[String]) -> LazyFrame {
    lf.select(columns.iter().map(|c| col(c.as_str())).collect::<Vec<_>>())
}

/// Appends the rows of the right table below the left one.
///
/// With `subset_columns`, only those columns are kept from both sides.
/// Otherwise a strict rule requires both sides to have the same columns,
/// while a non-strict one takes the union and fills the gaps with nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VConcatRule {
    #[serde(default)]
    pub named_input_left: Option<String>,
    #[serde(default)]
    pub named_input_right: Option<String>,
    #[serde(default)]
    pub subset_columns: Option<Vec<String>>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl VConcatRule {
    pub fn new(left: Option<&str>, right: Option<&str>) -> Self {
        Self {
            named_input_left: left.map(str::to_owned),
            named_input_right: right.map(str::to_owned),
            subset_columns: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    #[must_use]
    pub fn with_subset_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subset_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    fn concat(&self, left: Operand, right: Operand) -> Result<LazyFrame> {
        let args = UnionArgs::default();
        if let Some(subset) = &self.subset_columns {
            check_columns(
                &left.columns,
                subset,
                "Missing columns in the left dataframe of the concat operation",
            )?;
            check_columns(
                &right.columns,
                subset,
                "Missing columns in the right dataframe of the concat operation",
            )?;
            return Ok(concat([select(left.lf, subset), select(right.lf, subset)], args)?);
        }
        if !self.meta.strict {
            return Ok(concat_lf_diagonal([left.lf, right.lf], args)?);
        }
        let missing_right: BTreeSet<&str> = missing_columns(&right.columns, &left.columns).into_iter().collect();
        let missing_left: BTreeSet<&str> = missing_columns(&left.columns, &right.columns).into_iter().collect();
        if !missing_right.is_empty() || !missing_left.is_empty() {
            return Err(EtlError::Schema(format!(
                "Concat needs both dataframe have the same schema. \
                 Missing columns in the right df: {missing_right:?}. \
                 Missing columns in the left df: {missing_left:?}"
            )));
        }
        Ok(concat([left.lf, select(right.lf, &left.columns)], args)?)
    }
}

rule_builders!(VConcatRule, binary);

impl FrameRule for VConcatRule {
    frame_rule_io!(binary, "VConcatRule");

    fn prepare(&mut self) -> Result<()> {
        if self.subset_columns.as_ref().is_some_and(Vec::is_empty) {
            return Err(EtlError::InvalidRule(
                "VConcatRule: subset_columns cannot be an empty list".to_owned(),
            ));
        }
        Ok(())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform2(
            data,
            self.named_input_left.as_deref(),
            self.named_input_right.as_deref(),
            self.named_output.as_deref(),
            |left, right| self.concat(left, right),
        )
    }
}

/// Places the columns of the right table next to the left one's.
///
/// Column names present on both sides are an error when strict; otherwise
/// the right-hand copies get an `_r` suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HConcatRule {
    #[serde(default)]
    pub named_input_left: Option<String>,
    #[serde(default)]
    pub named_input_right: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl HConcatRule {
    pub fn new(left: Option<&str>, right: Option<&str>) -> Self {
        Self {
            named_input_left: left.map(str::to_owned),
            named_input_right: right.map(str::to_owned),
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    fn concat(&self, left: Operand, right: Operand) -> Result<LazyFrame> {
        let overlap: BTreeSet<&str> = right
            .columns
            .iter()
            .filter(|c| left.columns.contains(c))
            .map(String::as_str)
            .collect();
        if !overlap.is_empty() && self.meta.strict {
            return Err(EtlError::ColumnAlreadyExists(format!(
                "Column(s) {overlap:?} exist in both dataframes"
            )));
        }
        let right_exprs: Vec<Expr> = right
            .columns
            .iter()
            .map(|name| {
                if overlap.contains(name.as_str()) {
                    col(name.as_str()).alias(format!("{name}_r"))
                } else {
                    col(name.as_str())
                }
            })
            .collect();
        Ok(concat_lf_horizontal(
            [left.lf, right.lf.select(right_exprs)],
            UnionArgs::default(),
        )?)
    }
}

rule_builders!(HConcatRule, binary);

impl FrameRule for HConcatRule {
    frame_rule_io!(binary, "HConcatRule");

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform2(
            data,
            self.named_input_left.as_deref(),
            self.named_input_right.as_deref(),
            self.named_output.as_deref(),
            |left, right| self.concat(left, right),
        )
    }
}
