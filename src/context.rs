//! Run context: scalar parameters available to rules for string interpolation.
//!
//! A plan declares context defaults (for example a file name or a table
//! name); the runner may override them from the command line. Rule parameters
//! reference them as `{context.<key>}`, and environment variables as
//! `{env.<NAME>}` (an unset variable is empty):
//!
//! ```
//! use etl_rules::context::{Context, ContextValue};
//!
//! let mut ctx = Context::new();
//! ctx.insert("csv_file_name", "books.csv");
//! assert_eq!(ctx.interpolate("{context.csv_file_name}").unwrap(), "books.csv");
//! ```

use crate::error::{EtlError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{context\.([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{env\.([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// A scalar context value. The variant decides how CLI overrides are parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Read-only (for the duration of a run) mapping of parameter names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a copy of `self` with every entry of `overrides` applied on top.
    pub fn merged(&self, overrides: &Self) -> Self {
        let mut values = self.values.clone();
        values.extend(
            overrides
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self { values }
    }

    /// Substitute every `{context.<key>}` and `{env.<NAME>}` placeholder in
    /// `template`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Context`] naming the first placeholder whose key is
    /// not present in the context.
    pub fn interpolate(&self, template: &str) -> Result<String> {
        if let Some(missing) = PLACEHOLDER
            .captures_iter(template)
            .filter_map(|caps| caps.get(1))
            .find(|key| !self.values.contains_key(key.as_str()))
        {
            return Err(EtlError::Context(format!(
                "Unknown context key '{}' in '{template}'",
                missing.as_str()
            )));
        }

        let result = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .and_then(|key| self.values.get(key.as_str()))
                .map(ToString::to_string)
                .unwrap_or_default()
        });
        let result = ENV_PLACEHOLDER.replace_all(&result, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .and_then(|name| std::env::var(name.as_str()).ok())
                .unwrap_or_default()
        });
        Ok(result.into_owned())
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<ContextValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
