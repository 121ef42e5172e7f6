//! Polars table types and their backends.
//!
//! Rule bodies are written once against [`LazyFrame`] and shipped for two
//! table types:
//!
//! | Backend        | Table type    | Materialization                      |
//! |----------------|---------------|--------------------------------------|
//! | `polars`       | [`DataFrame`] | after every rule                     |
//! | `polars_lazy`  | [`LazyFrame`] | in writer rules, or by the caller    |
//!
//! Both backends register the same rule kinds, so a plan file loads
//! unchanged against either.

use crate::backend::Backend;
use crate::error::{EtlError, Result};
use crate::rules;
use polars::prelude::{DataFrame, IntoLazy, LazyFrame};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static EAGER: LazyLock<Backend<DataFrame>> = LazyLock::new(|| {
    let mut backend = Backend::new(DataFrame::BACKEND);
    rules::register_all(&mut backend);
    backend
});

static LAZY: LazyLock<Backend<LazyFrame>> = LazyLock::new(|| {
    let mut backend = Backend::new(LazyFrame::BACKEND);
    rules::register_all(&mut backend);
    backend
});

/// A polars table a rule can read from and write to.
pub trait Frame: Clone + Send + Sync + 'static {
    /// Name of the backend serving this table type.
    const BACKEND: &'static str;

    fn into_lazy(self) -> LazyFrame;

    /// # Errors
    ///
    /// Query execution failures for eager tables.
    fn from_lazy(lf: LazyFrame) -> Result<Self>;

    /// Column names, in order.
    ///
    /// # Errors
    ///
    /// Schema resolution failures for lazy tables.
    fn column_names(&self) -> Result<Vec<String>>;

    /// # Errors
    ///
    /// Query execution failures for lazy tables.
    fn into_df(self) -> Result<DataFrame>;

    /// The rule registry for this table type.
    fn backend() -> &'static Backend<Self>;
}

impl Frame for DataFrame {
    const BACKEND: &'static str = "polars";

    fn into_lazy(self) -> LazyFrame {
        self.lazy()
    }

    fn from_lazy(lf: LazyFrame) -> Result<Self> {
        Ok(lf.collect()?)
    }

    fn column_names(&self) -> Result<Vec<String>> {
        Ok(self
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str().to_owned())
            .collect())
    }

    fn into_df(self) -> Result<DataFrame> {
        Ok(self)
    }

    fn backend() -> &'static Backend<Self> {
        &EAGER
    }
}

impl Frame for LazyFrame {
    const BACKEND: &'static str = "polars_lazy";

    fn into_lazy(self) -> LazyFrame {
        self
    }

    fn from_lazy(lf: LazyFrame) -> Result<Self> {
        Ok(lf)
    }

    fn column_names(&self) -> Result<Vec<String>> {
        let schema = self.clone().collect_schema()?;
        Ok(schema
            .iter_names()
            .map(|name| name.as_str().to_owned())
            .collect())
    }

    fn into_df(self) -> Result<DataFrame> {
        Ok(self.collect()?)
    }

    fn backend() -> &'static Backend<Self> {
        &LAZY
    }
}

/// The shipped backends, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendKind {
    /// Eager `DataFrame`s
    #[default]
    #[value(name = "polars")]
    Polars,

    /// Lazy queries, collected by writers
    #[value(name = "polars_lazy")]
    PolarsLazy,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Polars => DataFrame::BACKEND,
            Self::PolarsLazy => LazyFrame::BACKEND,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "polars" => Ok(Self::Polars),
            "polars_lazy" => Ok(Self::PolarsLazy),
            other => Err(EtlError::UnknownBackend(other.to_owned())),
        }
    }
}
