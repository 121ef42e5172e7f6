//! Filling nulls from neighbouring rows.

use super::validation::check_columns;
use super::{FrameRule, frame_rule_io, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Shared body: optionally sort, then fill each column (per group when
/// `group_by` is set).
#[expect(clippy::too_many_arguments)]
fn fill<F: Frame>(
    data: &mut RuleData<F>,
    named_input: Option<&str>,
    named_output: Option<&str>,
    columns: &[String],
    sort_by: Option<&[String]>,
    sort_ascending: bool,
    group_by: Option<&[String]>,
    strategy: FillNullStrategy,
) -> Result<()> {
    transform(data, named_input, named_output, |lf, available| {
        check_columns(available, columns, "Missing columns to fill")?;
        let mut lf = lf;
        if let Some(sort_by) = sort_by {
            check_columns(available, sort_by, "Missing sort_by columns")?;
            lf = lf.sort_by_exprs(
                sort_by.iter().map(|c| col(c.as_str())).collect::<Vec<_>>(),
                SortMultipleOptions::default()
                    .with_order_descending(!sort_ascending)
                    .with_maintain_order(true),
            );
        }
        let partition: Option<Vec<Expr>> = match group_by {
            Some(group_by) => {
                check_columns(available, group_by, "Missing group_by columns")?;
                Some(group_by.iter().map(|c| col(c.as_str())).collect())
            }
            None => None,
        };
        let exprs: Vec<Expr> = columns
            .iter()
            .map(|c| {
                let filled = col(c.as_str()).fill_null_with_strategy(strategy);
                match &partition {
                    Some(partition) => filled.over(partition),
                    None => filled,
                }
            })
            .collect();
        Ok(lf.with_columns(exprs))
    })
}

fn check_fill_params(kind: &str, columns: &[String], group_by: Option<&[String]>) -> Result<()> {
    if columns.is_empty() {
        return Err(EtlError::InvalidRule(format!("{kind}: columns cannot be empty")));
    }
    if group_by.is_some_and(<[String]>::is_empty) {
        return Err(EtlError::InvalidRule(format!("{kind}: group_by cannot be an empty list")));
    }
    Ok(())
}

macro_rules! fill_rule {
    ($(#[$doc:meta])* $name:ident, $kind:literal, $strategy:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub columns: Vec<String>,
            #[serde(default)]
            pub sort_by: Option<Vec<String>>,
            #[serde(default = "default_ascending")]
            pub sort_ascending: bool,
            #[serde(default)]
            pub group_by: Option<Vec<String>>,
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
                    columns: columns.into_iter().map(Into::into).collect(),
                    sort_by: None,
                    sort_ascending: true,
                    group_by: None,
                    named_input: None,
                    named_output: None,
                    meta: RuleMeta::default(),
                }
            }

            /// Sort the table by `sort_by` before filling.
            #[must_use]
            pub fn with_sort_by<I, S>(mut self, sort_by: I, ascending: bool) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.sort_by = Some(sort_by.into_iter().map(Into::into).collect());
                self.sort_ascending = ascending;
                self
            }

            /// Only fill from rows of the same group.
            #[must_use]
            pub fn with_group_by<I, S>(mut self, group_by: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.group_by = Some(group_by.into_iter().map(Into::into).collect());
                self
            }
        }

        rule_builders!($name, unary);

        impl FrameRule for $name {
            frame_rule_io!(unary, $kind);

            fn prepare(&mut self) -> Result<()> {
                check_fill_params($kind, &self.columns, self.group_by.as_deref())
            }

            fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
                fill(
                    data,
                    self.named_input.as_deref(),
                    self.named_output.as_deref(),
                    &self.columns,
                    self.sort_by.as_deref(),
                    self.sort_ascending,
                    self.group_by.as_deref(),
                    $strategy,
                )
            }
        }
    };
}

fn default_ascending() -> bool {
    true
}

fill_rule!(
    /// Replaces nulls with the last non-null value above them.
    ForwardFillRule,
    "ForwardFillRule",
    FillNullStrategy::Forward(None)
);

fill_rule!(
    /// Replaces nulls with the next non-null value below them.
    BackFillRule,
    "BackFillRule",
    FillNullStrategy::Backward(None)
);
