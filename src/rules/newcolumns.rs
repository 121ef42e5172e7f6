//! Computed columns.

use super::expressions::{ExprCache, check_against};
use super::validation::check_new_columns;
use super::{FrameRule, frame_rule_io, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use serde::{Deserialize, Serialize};
use std::slice;

/// Adds `column_name`, set to the value of `column_expression`.
///
/// A strict rule refuses to overwrite an existing column; a non-strict one
/// replaces it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNewColumnRule {
    pub column_name: String,
    pub column_expression: String,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
    #[serde(skip)]
    compiled: ExprCache,
}

impl AddNewColumnRule {
    /// # Errors
    ///
    /// [`EtlError::ExpressionSyntax`] for an invalid expression.
    pub fn new(column_name: impl Into<String>, column_expression: impl Into<String>) -> Result<Self> {
        let mut rule = Self {
            column_name: column_name.into(),
            column_expression: column_expression.into(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
            compiled: ExprCache::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }
}

rule_builders!(AddNewColumnRule, unary);

impl FrameRule for AddNewColumnRule {
    frame_rule_io!(unary, "AddNewColumnRule");

    fn prepare(&mut self) -> Result<()> {
        if self.column_name.is_empty() {
            return Err(EtlError::InvalidRule("AddNewColumnRule: column_name cannot be empty".to_owned()));
        }
        self.compiled.compile(&self.column_expression)
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            if self.meta.strict {
                check_new_columns(available, slice::from_ref(&self.column_name))?;
            }
            let expr = self
                .compiled
                .get(&self.column_expression)?
                .alias(self.column_name.as_str());
            check_against(&lf, &expr)?;
            Ok(lf.with_column(expr))
        })
    }
}
