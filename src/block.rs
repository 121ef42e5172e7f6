//! Encapsulated rule sequences.
//!
//! A [`RulesBlock`] runs its children against a fresh [`RuleData`] seeded
//! with the block's input as the main table and a snapshot of the enclosing
//! named tables. Whatever named tables the children create stay inside the
//! block; only the final main table is written to the block's own output.

use crate::backend::Backend;
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::rule::{Rule, RuleInputs, RuleMeta, check_known_params, same_rule};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// A rule made of an ordered, non-empty sequence of child rules.
pub struct RulesBlock<T> {
    rules: Vec<Box<dyn Rule<T>>>,
    named_input: Option<String>,
    named_output: Option<String>,
    meta: RuleMeta,
}

/// Every serialized field except `rules`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BlockFields {
    #[serde(default)]
    named_input: Option<String>,
    #[serde(default)]
    named_output: Option<String>,
    #[serde(flatten)]
    meta: RuleMeta,
}

impl<T> fmt::Debug for RulesBlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RulesBlock")
            .field("rules", &self.rules)
            .field("named_input", &self.named_input)
            .field("named_output", &self.named_output)
            .field("meta", &self.meta)
            .finish()
    }
}

impl<T> Clone for RulesBlock<T> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            named_input: self.named_input.clone(),
            named_output: self.named_output.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T> PartialEq for RulesBlock<T> {
    fn eq(&self, other: &Self) -> bool {
        self.named_input == other.named_input
            && self.named_output == other.named_output
            && self.meta == other.meta
            && self.rules.len() == other.rules.len()
            && self
                .rules
                .iter()
                .zip(&other.rules)
                .all(|(a, b)| a.eq_rule(b.as_ref()))
    }
}

impl<T> RulesBlock<T> {
    pub const KIND: &'static str = "RulesBlock";

    /// # Errors
    ///
    /// [`EtlError::InvalidRule`] if `rules` is empty, the first rule has an
    /// explicit named input, or the last rule has an explicit named output.
    pub fn new(rules: Vec<Box<dyn Rule<T>>>) -> Result<Self> {
        check_children(&rules)?;
        Ok(Self {
            rules,
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        })
    }

    /// Start an empty block; children are checked in [`RulesBlockBuilder::build`].
    pub fn builder() -> RulesBlockBuilder<T> {
        RulesBlockBuilder {
            rules: Vec::new(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        }
    }

    pub fn rules(&self) -> &[Box<dyn Rule<T>>] {
        &self.rules
    }

    #[must_use]
    pub fn with_named_input(mut self, name: impl Into<String>) -> Self {
        self.named_input = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_named_output(mut self, name: impl Into<String>) -> Self {
        self.named_output = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.meta.strict = strict;
        self
    }

    fn fields(&self) -> BlockFields {
        BlockFields {
            named_input: self.named_input.clone(),
            named_output: self.named_output.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RulesBlock<T> {
    /// Factory registered under [`RulesBlock::KIND`] in every backend.
    ///
    /// # Errors
    ///
    /// Malformed parameters, unknown child kinds, or a badly shaped child list.
    pub fn from_params(params: &Value, backend: &Backend<T>) -> Result<Box<dyn Rule<T>>> {
        let mut rest = params
            .as_object()
            .cloned()
            .unwrap_or_default();
        let children = match rest.remove("rules") {
            Some(Value::Array(children)) => children,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(EtlError::Serialization(format!(
                    "RulesBlock: 'rules' must be a sequence, got: {other}"
                )));
            }
        };
        let rules = children
            .iter()
            .map(|child| backend.build(child))
            .collect::<Result<Vec<_>>>()?;

        let rest = Value::Object(rest);
        let fields: BlockFields = serde_json::from_value(rest.clone())?;
        check_known_params(Self::KIND, &rest, &serde_json::to_value(&fields)?)?;

        let mut block = Self::new(rules)?;
        block.named_input = fields.named_input;
        block.named_output = fields.named_output;
        block.meta = fields.meta;
        Ok(Box::new(block))
    }
}

fn check_children<T>(rules: &[Box<dyn Rule<T>>]) -> Result<()> {
    let (Some(first), Some(last)) = (rules.first(), rules.last()) else {
        return Err(EtlError::InvalidRule(
            "RulesBlock: empty rules set provided".to_owned(),
        ));
    };
    if let Some(input) = first.inputs().primary() {
        return Err(EtlError::InvalidRule(format!(
            "RulesBlock: the first rule must consume the block input, but {} reads named input '{input}'",
            first.kind()
        )));
    }
    if let Some(output) = last.named_output() {
        return Err(EtlError::InvalidRule(format!(
            "RulesBlock: the last rule must produce the block output, but {} writes named output '{output}'",
            last.kind()
        )));
    }
    Ok(())
}

impl<T: Clone + Send + Sync + 'static> Rule<T> for RulesBlock<T> {
    fn kind(&self) -> &'static str {
        Self::KIND
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

    fn apply(&self, data: &mut RuleData<T>) -> Result<()> {
        let input = data.input_cloned(self.named_input.as_deref())?;
        let mut inner = data.nested(input);
        for rule in &self.rules {
            tracing::debug!(block = ?self.meta.name, rule = rule.kind(), "applying nested rule");
            rule.apply(&mut inner)?;
        }
        let output = inner.take_main_output().ok_or(EtlError::MissingMainInput)?;
        data.set_output(self.named_output.as_deref(), output);
        Ok(())
    }

    fn to_params(&self) -> Result<Value> {
        let rules = self
            .rules
            .iter()
            .map(|rule| rule.to_dict())
            .collect::<Result<Vec<_>>>()?;
        let mut params = Map::new();
        params.insert("rules".to_owned(), Value::Array(rules));
        if let Value::Object(fields) = serde_json::to_value(self.fields())? {
            params.extend(fields);
        }
        Ok(Value::Object(params))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_rule(&self, other: &dyn Rule<T>) -> bool {
        same_rule(self, other)
    }

    fn clone_rule(&self) -> Box<dyn Rule<T>> {
        Box::new(self.clone())
    }
}

/// Incremental construction of a [`RulesBlock`].
pub struct RulesBlockBuilder<T> {
    rules: Vec<Box<dyn Rule<T>>>,
    named_input: Option<String>,
    named_output: Option<String>,
    meta: RuleMeta,
}

impl<T> RulesBlockBuilder<T> {
    #[must_use]
    pub fn rule<R: Rule<T> + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    #[must_use]
    pub fn boxed(mut self, rule: Box<dyn Rule<T>>) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn named_input(mut self, name: impl Into<String>) -> Self {
        self.named_input = Some(name.into());
        self
    }

    #[must_use]
    pub fn named_output(mut self, name: impl Into<String>) -> Self {
        self.named_output = Some(name.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: RuleMeta) -> Self {
        self.meta = meta;
        self
    }

    /// # Errors
    ///
    /// Same as [`RulesBlock::new`].
    pub fn build(self) -> Result<RulesBlock<T>> {
        check_children(&self.rules)?;
        Ok(RulesBlock {
            rules: self.rules,
            named_input: self.named_input,
            named_output: self.named_output,
            meta: self.meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AddRule, Table, test_backend};

    fn data(main: &[i64]) -> RuleData<Table> {
        RuleData::new().with_main_input(main.to_vec())
    }

    #[test]
    fn test_empty_block_rejected() {
        let err = RulesBlock::<Table>::new(Vec::new()).unwrap_err();
        assert!(matches!(err, EtlError::InvalidRule(_)));
    }

    #[test]
    fn test_first_rule_named_input_rejected() {
        let err = RulesBlock::<Table>::builder()
            .rule(AddRule::new(1).with_named_input("x"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("first rule"));
    }

    #[test]
    fn test_last_rule_named_output_rejected() {
        let err = RulesBlock::<Table>::builder()
            .rule(AddRule::new(1))
            .rule(AddRule::new(1).with_named_output("y"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("last rule"));
    }

    #[test]
    fn test_block_runs_children_in_order() {
        let block = RulesBlock::builder()
            .rule(AddRule::new(1))
            .rule(AddRule::new(10))
            .build()
            .unwrap();
        let mut data = data(&[1, 2]);
        block.apply(&mut data).unwrap();
        assert_eq!(data.get_main_output(), Some(&vec![12, 13]));
    }

    #[test]
    fn test_block_hides_internal_named_outputs() {
        let block = RulesBlock::builder()
            .rule(AddRule::new(1).with_named_output("tmp"))
            .rule(AddRule::new(100).with_named_input("tmp"))
            .build()
            .unwrap();
        let mut data = data(&[1]).with_named_input("outer", vec![5]);
        block.apply(&mut data).unwrap();

        assert_eq!(data.get_main_output(), Some(&vec![102]));
        assert!(!data.has_named_output("tmp"));
        assert_eq!(data.get_named_output("outer").unwrap(), &vec![5]);
    }

    #[test]
    fn test_block_children_see_outer_named_outputs() {
        let block = RulesBlock::builder()
            .rule(AddRule::new(0))
            .rule(AddRule::new(1).with_named_input("outer"))
            .build()
            .unwrap();
        let mut data = data(&[0]).with_named_input("outer", vec![41]);
        block.apply(&mut data).unwrap();
        assert_eq!(data.get_main_output(), Some(&vec![42]));
    }

    #[test]
    fn test_block_overwrite_of_outer_name_stays_inside() {
        let block = RulesBlock::builder()
            .rule(AddRule::new(1).with_named_output("outer"))
            .rule(AddRule::new(0).with_named_input("outer"))
            .build()
            .unwrap();
        let mut data = data(&[1]).with_named_input("outer", vec![7]);
        block.apply(&mut data).unwrap();
        assert_eq!(data.get_main_output(), Some(&vec![2]));
        assert_eq!(data.get_named_output("outer").unwrap(), &vec![7]);
    }

    #[test]
    fn test_block_named_io() {
        let block = RulesBlock::builder()
            .rule(AddRule::new(1))
            .named_input("in")
            .named_output("out")
            .build()
            .unwrap();
        let mut data = data(&[0]).with_named_input("in", vec![10]);
        block.apply(&mut data).unwrap();
        assert_eq!(data.get_named_output("out").unwrap(), &vec![11]);
        assert_eq!(data.get_main_output(), Some(&vec![0]));
    }

    #[test]
    fn test_block_round_trip() {
        let backend = test_backend();
        let block = RulesBlock::builder()
            .rule(AddRule::new(1).with_named_output("tmp"))
            .rule(AddRule::new(2).with_named_input("tmp"))
            .named_input("BC1")
            .named_output("BC2")
            .meta(RuleMeta {
                name: Some("Block".to_owned()),
                description: Some("Test".to_owned()),
                strict: false,
            })
            .build()
            .unwrap();
        let block: Box<dyn Rule<Table>> = Box::new(block);

        let dct = block.to_dict().unwrap();
        let rebuilt = crate::rule::from_dict(&dct, &backend).unwrap();
        assert!(*rebuilt == *block);

        let yml = block.to_yaml().unwrap();
        assert!(yml.contains("RulesBlock"));
        let rebuilt = crate::rule::from_yaml(&yml, &backend).unwrap();
        assert!(*rebuilt == *block);
    }

    #[test]
    fn test_block_from_params_checks_children() {
        let backend = test_backend();
        let dct = serde_json::json!({"RulesBlock": {"rules": []}});
        assert!(matches!(
            backend.build(&dct),
            Err(EtlError::InvalidRule(_))
        ));
    }
}
