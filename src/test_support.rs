//! In-memory rules over a toy table type, for exercising the core without polars.

use crate::backend::Backend;
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::rule::{Rule, RuleInputs, RuleMeta, check_known_params, same_rule};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;

pub type Table = Vec<i64>;

fn build<R>(kind: &str, params: &Value) -> Result<R>
where
    R: Serialize + DeserializeOwned,
{
    let rule: R = serde_json::from_value(params.clone())?;
    check_known_params(kind, params, &serde_json::to_value(&rule)?)?;
    Ok(rule)
}

/// Adds `amount` to every cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRule {
    pub amount: i64,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl AddRule {
    pub fn new(amount: i64) -> Self {
        Self {
            amount,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    pub fn with_named_input(mut self, name: &str) -> Self {
        self.named_input = Some(name.to_owned());
        self
    }

    pub fn with_named_output(mut self, name: &str) -> Self {
        self.named_output = Some(name.to_owned());
        self
    }
}

impl Rule<Table> for AddRule {
    fn kind(&self) -> &'static str {
        "AddRule"
    }

    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn inputs(&self) -> RuleInputs<'_> {
        RuleInputs::Unary(self.named_input.as_deref())
    }

    fn named_output(&self) -> Option<&str> {
        self.named_output.as_deref()
    }

    fn apply(&self, data: &mut RuleData<Table>) -> Result<()> {
        let out = data
            .input(self.named_input.as_deref())?
            .iter()
            .map(|v| v + self.amount)
            .collect();
        data.set_output(self.named_output.as_deref(), out);
        Ok(())
    }

    fn to_params(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_rule(&self, other: &dyn Rule<Table>) -> bool {
        same_rule(self, other)
    }

    fn clone_rule(&self) -> Box<dyn Rule<Table>> {
        Box::new(self.clone())
    }
}

pub fn add_rule_factory(params: &Value, _: &Backend<Table>) -> Result<Box<dyn Rule<Table>>> {
    Ok(Box::new(build::<AddRule>("AddRule", params)?))
}

/// Consumes its input without producing a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRule {
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl SinkRule {
    pub fn new() -> Self {
        Self {
            named_input: None,
            meta: RuleMeta::default(),
        }
    }
}

impl Rule<Table> for SinkRule {
    fn kind(&self) -> &'static str {
        "SinkRule"
    }

    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn inputs(&self) -> RuleInputs<'_> {
        RuleInputs::Unary(self.named_input.as_deref())
    }

    fn named_output(&self) -> Option<&str> {
        None
    }

    fn has_output(&self) -> bool {
        false
    }

    fn apply(&self, data: &mut RuleData<Table>) -> Result<()> {
        data.input(self.named_input.as_deref())?;
        Ok(())
    }

    fn to_params(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_rule(&self, other: &dyn Rule<Table>) -> bool {
        same_rule(self, other)
    }

    fn clone_rule(&self) -> Box<dyn Rule<Table>> {
        Box::new(self.clone())
    }
}

pub fn sink_rule_factory(params: &Value, _: &Backend<Table>) -> Result<Box<dyn Rule<Table>>> {
    Ok(Box::new(build::<SinkRule>("SinkRule", params)?))
}

/// Always fails; used to check that earlier writes are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailRule {
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl FailRule {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::default(),
        }
    }
}

impl Rule<Table> for FailRule {
    fn kind(&self) -> &'static str {
        "FailRule"
    }

    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn inputs(&self) -> RuleInputs<'_> {
        RuleInputs::Unary(None)
    }

    fn named_output(&self) -> Option<&str> {
        None
    }

    fn apply(&self, _: &mut RuleData<Table>) -> Result<()> {
        Err(EtlError::Other("FailRule always fails".to_owned()))
    }

    fn to_params(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_rule(&self, other: &dyn Rule<Table>) -> bool {
        same_rule(self, other)
    }

    fn clone_rule(&self) -> Box<dyn Rule<Table>> {
        Box::new(self.clone())
    }
}

pub fn fail_rule_factory(params: &Value, _: &Backend<Table>) -> Result<Box<dyn Rule<Table>>> {
    Ok(Box::new(build::<FailRule>("FailRule", params)?))
}

/// A backend that knows every rule in this module.
pub fn test_backend() -> Backend<Table> {
    let mut backend = Backend::new("test");
    backend
        .register("AddRule", add_rule_factory)
        .register("SinkRule", sink_rule_factory)
        .register("FailRule", fail_rule_factory);
    backend
}
