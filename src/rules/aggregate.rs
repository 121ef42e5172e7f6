//! Group-by aggregation.

use super::types::parse_type;
use super::validation::check_columns;
use super::{FrameRule, frame_rule_io, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregation names accepted by [`AggregateRule`].
pub const AGGREGATIONS: &[&str] = &[
    "min",
    "max",
    "mean",
    "count",
    "countNoNA",
    "sum",
    "first",
    "last",
    "list",
    "csv",
    "countDistinct",
];

/// The expression computing aggregation `name` over `column` within a group.
///
/// # Errors
///
/// [`EtlError::InvalidRule`] for an unknown aggregation.
pub fn aggregation(column: &str, name: &str) -> Result<Expr> {
    let c = col(column);
    Ok(match name {
        "min" => c.min(),
        "max" => c.max(),
        "mean" => c.mean(),
        "count" => c.len(),
        "countNoNA" => c.count(),
        "sum" => c.sum(),
        "first" => c.first(),
        "last" => c.last(),
        "list" => c.drop_nulls(),
        "csv" => c.drop_nulls().cast(DataType::String).str().join(",", true),
        "countDistinct" => c.n_unique(),
        other => {
            return Err(EtlError::InvalidRule(format!(
                "AggregateRule: unknown aggregation '{other}' for column '{column}'. \
                 Supported: {}",
                AGGREGATIONS.join(", ")
            )));
        }
    }
    .alias(column))
}

/// Groups rows by `group_by` and aggregates the columns in `aggregations`.
///
/// Groups appear in order of first occurrence and the aggregated columns in
/// the order `aggregations` lists them. `aggregation_types`
/// optionally casts aggregated columns, using the names of
/// [`super::types::SUPPORTED_TYPES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRule {
    pub group_by: Vec<String>,
    pub aggregations: IndexMap<String, String>,
    #[serde(default)]
    pub aggregation_types: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl AggregateRule {
    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] for an empty `group_by` or an unknown
    /// aggregation.
    pub fn new<G, S, A, K, V>(group_by: G, aggregations: A) -> Result<Self>
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
        A: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut rule = Self {
            group_by: group_by.into_iter().map(Into::into).collect(),
            aggregations: aggregations
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            aggregation_types: None,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }

    /// # Errors
    ///
    /// [`EtlError::UnsupportedType`] for an unknown type name.
    pub fn with_aggregation_types<I, K, V>(mut self, types: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.aggregation_types = Some(types.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self.prepare()?;
        Ok(self)
    }
}

rule_builders!(AggregateRule, unary);

impl FrameRule for AggregateRule {
    frame_rule_io!(unary, "AggregateRule");

    fn prepare(&mut self) -> Result<()> {
        if self.group_by.is_empty() {
            return Err(EtlError::InvalidRule("AggregateRule: group_by cannot be empty".to_owned()));
        }
        for (column, name) in &self.aggregations {
            aggregation(column, name)?;
        }
        for type_name in self.aggregation_types.iter().flat_map(BTreeMap::values) {
            parse_type(type_name)?;
        }
        Ok(())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns(available, &self.group_by, "Missing group_by columns")?;
            check_columns(available, self.aggregations.keys(), "Missing columns to aggregate")?;
            let aggs = self
                .aggregations
                .iter()
                .map(|(column, name)| {
                    let expr = aggregation(column, name)?;
                    match self.aggregation_types.as_ref().and_then(|t| t.get(column)) {
                        Some(type_name) => Ok(expr.cast(parse_type(type_name)?)),
                        None => Ok(expr),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            let keys: Vec<Expr> = self.group_by.iter().map(|c| col(c.as_str())).collect();
            Ok(lf.group_by_stable(keys).agg(aggs))
        })
    }
}
