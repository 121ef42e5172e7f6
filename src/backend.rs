//! Backend registries.
//!
//! A backend is a named table implementation together with the set of rule
//! kinds it can build. Deserialization looks a rule's kind up in the backend's
//! registry and hands the stored parameters to the registered factory:
//!
//! ```text
//! {SortRule: {sort_by: [A]}}  --"SortRule"-->  factory(params, backend)  -->  Box<dyn Rule<T>>
//! ```
//!
//! [`RulesBlock`] is registered in every backend, since it only composes
//! other rules.

use crate::block::RulesBlock;
use crate::error::{EtlError, Result};
use crate::rule::{Rule, split_dict};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Builds a rule from its parameter mapping. The backend is passed along so
/// composite rules can resolve their children.
pub type RuleFactory<T> = fn(&Value, &Backend<T>) -> Result<Box<dyn Rule<T>>>;

/// A rule registry keyed by rule kind.
pub struct Backend<T> {
    name: &'static str,
    factories: HashMap<&'static str, RuleFactory<T>>,
}

impl<T> fmt::Debug for Backend<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Backend<T> {
    /// A registry that only knows [`RulesBlock`].
    pub fn new(name: &'static str) -> Self {
        let mut backend = Self {
            name,
            factories: HashMap::new(),
        };
        backend.register(RulesBlock::<T>::KIND, RulesBlock::<T>::from_params);
        backend
    }
}

impl<T> Backend<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register(&mut self, kind: &'static str, factory: RuleFactory<T>) -> &mut Self {
        self.factories.insert(kind, factory);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a rule from `{Kind: params}`.
    ///
    /// # Errors
    ///
    /// [`EtlError::Serialization`] for a malformed dict,
    /// [`EtlError::UnknownRule`] for an unregistered kind, or the factory's own
    /// construction error.
    pub fn build(&self, dct: &Value) -> Result<Box<dyn Rule<T>>> {
        let (kind, params) = split_dict(dct)?;
        self.build_kind(kind, &params)
    }

    /// Build a rule of `kind` from its parameter mapping.
    ///
    /// # Errors
    ///
    /// Same as [`Backend::build`].
    pub fn build_kind(&self, kind: &str, params: &Value) -> Result<Box<dyn Rule<T>>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| EtlError::UnknownRule {
                backend: self.name.to_owned(),
                kind: kind.to_owned(),
            })?;
        factory(params, self)
    }
}
