//! Error types for plan construction, serialization and rule execution.
//!
//! Errors fall into four groups:
//!
//! - **Structural**: a plan mixes pipeline and graph rules, a rule kind is not
//!   known to a backend, a serialized payload is malformed, a rules block is
//!   badly shaped. Always raised.
//! - **Routing**: a rule reads a main or named input that was never produced.
//!   Always raised, regardless of a rule's `strict` flag.
//! - **Data quality**: missing columns, output columns that already exist,
//!   mismatched schemas, unsupported types, expression syntax errors. Raised by rule bodies, some
//!   of them only when the rule is strict.
//! - **Infrastructure**: I/O and dataframe library failures.
//!
//! ```
//! use etl_rules::error::EtlError;
//!
//! fn describe(err: &EtlError) -> &'static str {
//!     match err {
//!         EtlError::MissingNamedInput(_) | EtlError::MissingMainInput => "routing",
//!         EtlError::MissingColumn(_) | EtlError::ColumnAlreadyExists(_) => "data quality",
//!         _ => "other",
//!     }
//! }
//! ```

use crate::plan::PlanMode;
use std::fmt;

/// Main error type for plan and rule operations.
#[derive(Debug)]
pub enum EtlError {
    /// I/O errors (reading plans, reading or writing data files)
    Io(std::io::Error),

    /// Errors raised by the dataframe library
    DataProcessing(String),

    /// Malformed dict/YAML payloads
    Serialization(String),

    /// A rule kind that the backend does not provide
    UnknownRule { backend: String, kind: String },

    /// A backend name with no registry behind it
    UnknownBackend(String),

    /// A rule whose output shape contradicts the plan's execution mode
    PlanMode {
        expected: PlanMode,
        found: PlanMode,
        rule: String,
    },

    /// Construction-time invariant violated by a rule's parameters
    InvalidRule(String),

    /// A rule read the main output before anything produced it
    MissingMainInput,

    /// A rule read a named output that was never produced
    MissingNamedInput(String),

    /// A column the rule operates on is absent from its input
    MissingColumn(String),

    /// A column the rule would create is already present
    ColumnAlreadyExists(String),

    /// Two tables that must share a layout do not
    Schema(String),

    /// A type name that cannot be converted to
    UnsupportedType(String),

    /// An embedded expression failed to parse
    ExpressionSyntax(String),

    /// Context interpolation failures
    Context(String),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            Self::UnknownRule { backend, kind } => {
                write!(f, "Rule '{kind}' not found for backend '{backend}'")
            }
            Self::UnknownBackend(name) => write!(f, "Unknown backend: {name}"),
            Self::PlanMode {
                expected,
                found,
                rule,
            } => write!(
                f,
                "Plan mode error: plan is in {expected} mode but rule '{rule}' requires {found} mode"
            ),
            Self::InvalidRule(msg) => write!(f, "Invalid rule: {msg}"),
            Self::MissingMainInput => write!(f, "Missing main input: no rule produced a main output"),
            Self::MissingNamedInput(name) => write!(f, "Missing named input: '{name}'"),
            Self::MissingColumn(msg) => write!(f, "Missing column: {msg}"),
            Self::ColumnAlreadyExists(msg) => write!(f, "Column already exists: {msg}"),
            Self::Schema(msg) => write!(f, "Schema error: {msg}"),
            Self::UnsupportedType(msg) => write!(f, "Unsupported type: {msg}"),
            Self::ExpressionSyntax(msg) => write!(f, "Expression syntax error: {msg}"),
            Self::Context(msg) => write!(f, "Context error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EtlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<polars::error::PolarsError> for EtlError {
    fn from(err: polars::error::PolarsError) -> Self {
        match err {
            polars::error::PolarsError::ColumnNotFound(msg) => Self::MissingColumn(msg.to_string()),
            other => Self::DataProcessing(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for EtlError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(format!("YAML error: {err}"))
    }
}

/// Result type alias for plan and rule operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error, converted to [`EtlError::Other`] with the
    /// message prepended.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    ///
    /// # Errors
    ///
    /// Same as [`ResultExt::context`].
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EtlError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: EtlError = e.into();
            EtlError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: EtlError = e.into();
            EtlError::Other(format!("{}: {}", f(), err))
        })
    }
}
