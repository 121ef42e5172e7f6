//! SQL expressions embedded in rule parameters.
//!
//! Expressions use polars' SQL expression syntax and refer to columns by
//! name:
//!
//! ```text
//! A + B * 2
//! CASE WHEN Status = 'open' THEN 1 ELSE 0 END
//! Name LIKE 'A%' AND Age >= 18
//! ```
//!
//! They are parsed when the rule is built, so syntax errors surface as
//! [`EtlError::ExpressionSyntax`] before any data is touched.

use crate::error::{EtlError, Result};
use polars::prelude::{Expr, LazyFrame, lit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parse `source` into a polars expression.
///
/// # Errors
///
/// [`EtlError::ExpressionSyntax`] if the text is not a valid expression.
pub fn parse_expression(source: &str) -> Result<Expr> {
    if source.trim().is_empty() {
        return Err(EtlError::ExpressionSyntax("expression cannot be empty".to_owned()));
    }
    polars::sql::sql_expr(source)
        .map_err(|e| EtlError::ExpressionSyntax(format!("Error in expression '{source}': {e}")))
}

/// Resolve `expr` against the schema of `lf` without running the query, so
/// unknown columns fail here rather than at collection time.
///
/// # Errors
///
/// [`EtlError::MissingColumn`] or [`EtlError::DataProcessing`].
pub fn check_against(lf: &LazyFrame, expr: &Expr) -> Result<()> {
    let mut probe = lf.clone().select([expr.clone()]);
    probe.collect_schema()?;
    Ok(())
}

/// A parsed expression kept next to its source text.
///
/// Not serialized and ignored by equality: two rules with the same source
/// are equal whether or not either has been parsed yet.
#[derive(Clone, Default)]
pub struct ExprCache(Option<Expr>);

impl ExprCache {
    /// # Errors
    ///
    /// Same as [`parse_expression`].
    pub fn compile(&mut self, source: &str) -> Result<()> {
        self.0 = Some(parse_expression(source)?);
        Ok(())
    }

    /// The cached expression, parsing `source` if nothing is cached.
    ///
    /// # Errors
    ///
    /// Same as [`parse_expression`].
    pub fn get(&self, source: &str) -> Result<Expr> {
        match &self.0 {
            Some(expr) => Ok(expr.clone()),
            None => parse_expression(source),
        }
    }
}

impl PartialEq for ExprCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl fmt::Debug for ExprCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "ExprCache(compiled)" } else { "ExprCache(empty)" })
    }
}

/// A literal value in rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScalarValue {
    pub fn to_lit(&self) -> Expr {
        match self {
            Self::Bool(v) => lit(*v),
            Self::Int(v) => lit(*v),
            Self::Float(v) => lit(*v),
            Self::Str(v) => lit(v.as_str()),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}
