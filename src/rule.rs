//! The rule contract.
//!
//! A rule is one configurable transformation step. It reads its input from a
//! [`RuleData`] slot, computes a new table and writes it back to an output
//! slot. Rules are immutable once built; `apply` only mutates the data
//! context.
//!
//! Every rule serializes to a single-key dict `{Kind: {param: value, ...}}`
//! where the params are exactly the arguments needed to rebuild it. The dict
//! is a [`serde_json::Value`]; YAML is a plain dump of that dict.
//!
//! ```yaml
//! SortRule:
//!   sort_by: [A]
//!   ascending: true
//!   named_input: null
//!   named_output: null
//!   name: null
//!   description: null
//!   strict: true
//! ```

use crate::backend::Backend;
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// Attributes shared by every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMeta {
    /// Human label describing the intent of the rule
    #[serde(default)]
    pub name: Option<String>,

    /// Longer documentation of what the rule does
    #[serde(default)]
    pub description: Option<String>,

    /// Whether data-quality violations raise (`true`) or are tolerated
    #[serde(default = "default_true")]
    pub strict: bool,
}

impl Default for RuleMeta {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            strict: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Where a rule takes its input(s) from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleInputs<'a> {
    /// The rule produces data from outside the context (e.g. a file reader).
    Source,
    /// One input; `None` means the main output.
    Unary(Option<&'a str>),
    /// Two inputs; either side may be the main output.
    Binary {
        left: Option<&'a str>,
        right: Option<&'a str>,
    },
}

impl<'a> RuleInputs<'a> {
    /// The explicitly named primary input (the left side for binary rules).
    pub fn primary(&self) -> Option<&'a str> {
        match *self {
            Self::Source => None,
            Self::Unary(input) => input,
            Self::Binary { left, .. } => left,
        }
    }

    /// All explicitly named inputs.
    pub fn named(&self) -> Vec<&'a str> {
        match *self {
            Self::Source => Vec::new(),
            Self::Unary(input) => input.into_iter().collect(),
            Self::Binary { left, right } => left.into_iter().chain(right).collect(),
        }
    }
}

/// One unit of work in a plan, generic over the table type `T`.
pub trait Rule<T>: fmt::Debug + Send + Sync {
    /// The type tag used in the serialized dict (e.g. `"SortRule"`).
    fn kind(&self) -> &'static str;

    fn meta(&self) -> &RuleMeta;

    fn inputs(&self) -> RuleInputs<'_>;

    /// The named output slot, or `None` for the main output.
    fn named_output(&self) -> Option<&str>;

    /// `false` for sinks that consume a table without producing one.
    fn has_output(&self) -> bool {
        true
    }

    /// Every named slot this rule writes. Usually just [`Rule::named_output`].
    fn named_outputs(&self) -> Vec<&str> {
        if self.has_output() {
            self.named_output().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Read the configured input(s) from `data` and write the result back.
    ///
    /// # Errors
    ///
    /// Routing errors for missing inputs, plus whatever the rule body raises.
    fn apply(&self, data: &mut RuleData<T>) -> Result<()>;

    /// The constructor parameters, as a mapping.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Serialization`] if a parameter cannot be encoded.
    fn to_params(&self) -> Result<Value>;

    /// `{Kind: params}`.
    ///
    /// # Errors
    ///
    /// Same as [`Rule::to_params`].
    fn to_dict(&self) -> Result<Value> {
        let mut dct = Map::new();
        dct.insert(self.kind().to_owned(), self.to_params()?);
        Ok(Value::Object(dct))
    }

    /// YAML dump of [`Rule::to_dict`].
    ///
    /// # Errors
    ///
    /// Same as [`Rule::to_params`].
    fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_dict()?)?)
    }

    fn as_any(&self) -> &dyn Any;

    /// Structural equality against another rule of any kind.
    fn eq_rule(&self, other: &dyn Rule<T>) -> bool;

    fn clone_rule(&self) -> Box<dyn Rule<T>>;
}

impl<T> PartialEq for dyn Rule<T> {
    fn eq(&self, other: &Self) -> bool {
        self.eq_rule(other)
    }
}

impl<T> Clone for Box<dyn Rule<T>> {
    fn clone(&self) -> Self {
        self.clone_rule()
    }
}

/// Equality helper for [`Rule::eq_rule`] implementations: same concrete type
/// and equal fields.
pub fn same_rule<R, T>(this: &R, other: &dyn Rule<T>) -> bool
where
    R: PartialEq + 'static,
{
    other
        .as_any()
        .downcast_ref::<R>()
        .is_some_and(|other| other == this)
}

/// Rebuild a rule from its dict form, resolving the kind against `backend`.
///
/// # Errors
///
/// [`EtlError::Serialization`] for a malformed dict, [`EtlError::UnknownRule`]
/// if the backend does not provide the kind, or the rule's own construction
/// errors.
pub fn from_dict<T>(dct: &Value, backend: &Backend<T>) -> Result<Box<dyn Rule<T>>> {
    backend.build(dct)
}

/// Rebuild a rule from its YAML form, see [`from_dict`].
///
/// # Errors
///
/// Malformed YAML plus everything [`from_dict`] can return.
pub fn from_yaml<T>(yml: &str, backend: &Backend<T>) -> Result<Box<dyn Rule<T>>> {
    let dct: Value = serde_yaml::from_str(yml)?;
    from_dict(&dct, backend)
}

/// Split `{Kind: params}` into its two halves. A null params node (`Kind:`
/// with nothing under it) reads as an empty mapping.
///
/// # Errors
///
/// [`EtlError::Serialization`] unless `dct` is a mapping with exactly one key.
pub fn split_dict(dct: &Value) -> Result<(&str, Value)> {
    let obj = dct
        .as_object()
        .ok_or_else(|| EtlError::Serialization(format!("Expected a rule mapping, got: {dct}")))?;
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some((kind, params)), None) => {
            let params = match params {
                Value::Null => Value::Object(Map::new()),
                Value::Object(_) => params.clone(),
                other => {
                    return Err(EtlError::Serialization(format!(
                        "Parameters of rule '{kind}' must be a mapping, got: {other}"
                    )));
                }
            };
            Ok((kind.as_str(), params))
        }
        _ => Err(EtlError::Serialization(format!(
            "A rule dict must have exactly one key (the rule kind), got {} keys",
            obj.len()
        ))),
    }
}

/// Reject parameters a rule does not declare. `emitted` is the rule's own
/// serialized form, which lists every field it accepts.
///
/// # Errors
///
/// [`EtlError::InvalidRule`] naming the unexpected parameters.
pub fn check_known_params(kind: &str, given: &Value, emitted: &Value) -> Result<()> {
    let (Some(given), Some(emitted)) = (given.as_object(), emitted.as_object()) else {
        return Ok(());
    };
    let unknown: Vec<&str> = given
        .keys()
        .filter(|k| !emitted.contains_key(k.as_str()))
        .map(String::as_str)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(EtlError::InvalidRule(format!(
            "{kind}: unexpected parameter(s): {}",
            unknown.join(", ")
        )))
    }
}
