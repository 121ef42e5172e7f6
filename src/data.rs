//! The data context a plan runs against.
//!
//! [`RuleData`] holds one optional *main* table, any number of *named* tables
//! and the run [`Context`]. Rules read their input from one of these slots and
//! write their result back into one. The table type `T` is opaque here.

use crate::context::Context;
use crate::error::{EtlError, Result};
use std::collections::HashMap;
use std::fmt;

/// Mutable slot store for the tables produced during a run.
#[derive(Clone)]
pub struct RuleData<T> {
    main: Option<T>,
    named: HashMap<String, T>,
    context: Context,
}

impl<T> fmt::Debug for RuleData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut named: Vec<&str> = self.named.keys().map(String::as_str).collect();
        named.sort_unstable();
        f.debug_struct("RuleData")
            .field("has_main", &self.main.is_some())
            .field("named", &named)
            .field("context", &self.context)
            .finish()
    }
}

impl<T> Default for RuleData<T> {
    fn default() -> Self {
        Self {
            main: None,
            named: HashMap::new(),
            context: Context::default(),
        }
    }
}

impl<T> RuleData<T> {
    /// Empty context: no main table, no named tables, no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the main slot.
    pub fn with_main_input(mut self, table: T) -> Self {
        self.main = Some(table);
        self
    }

    /// Seed a named slot.
    pub fn with_named_input(mut self, name: impl Into<String>, table: T) -> Self {
        self.named.insert(name.into(), table);
        self
    }

    /// Seed several named slots.
    pub fn with_named_inputs<K, I>(mut self, inputs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        self.named
            .extend(inputs.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The current main table, or `None` before anything produced one.
    pub fn get_main_output(&self) -> Option<&T> {
        self.main.as_ref()
    }

    pub fn set_main_output(&mut self, table: T) {
        self.main = Some(table);
    }

    /// Move the main table out, leaving the slot unset.
    pub fn take_main_output(&mut self) -> Option<T> {
        self.main.take()
    }

    /// # Errors
    ///
    /// Returns [`EtlError::MissingNamedInput`] if `name` was never set.
    pub fn get_named_output(&self, name: &str) -> Result<&T> {
        self.named
            .get(name)
            .ok_or_else(|| EtlError::MissingNamedInput(name.to_owned()))
    }

    /// Insert or overwrite a named table.
    pub fn set_named_output(&mut self, name: impl Into<String>, table: T) {
        self.named.insert(name.into(), table);
    }

    pub fn has_named_output(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// All named tables, in no particular order.
    pub fn get_named_outputs(&self) -> impl Iterator<Item = (&str, &T)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a rule input: `None` reads the main slot, `Some(name)` the named one.
    ///
    /// # Errors
    ///
    /// [`EtlError::MissingMainInput`] or [`EtlError::MissingNamedInput`] when
    /// the slot is empty.
    pub fn input(&self, named_input: Option<&str>) -> Result<&T> {
        match named_input {
            None => self.main.as_ref().ok_or(EtlError::MissingMainInput),
            Some(name) => self.get_named_output(name),
        }
    }

    /// Write a rule result: `None` replaces the main slot, `Some(name)` the named one.
    pub fn set_output(&mut self, named_output: Option<&str>, table: T) {
        match named_output {
            None => self.set_main_output(table),
            Some(name) => self.set_named_output(name, table),
        }
    }
}

impl<T: Clone> RuleData<T> {
    /// Owned copy of the input slot, see [`RuleData::input`].
    ///
    /// # Errors
    ///
    /// Same as [`RuleData::input`].
    pub fn input_cloned(&self, named_input: Option<&str>) -> Result<T> {
        self.input(named_input).cloned()
    }

    /// A fresh context seeded with `main` and a snapshot of this context's
    /// named tables and parameters. Writes to the child never reach `self`.
    pub fn nested(&self, main: T) -> Self {
        Self {
            main: Some(main),
            named: self
                .named
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            context: self.context.clone(),
        }
    }
}
