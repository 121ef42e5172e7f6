//! Loading and running plan files.
//!
//! A plan file is YAML. Its `context` section declares the parameters a run
//! can override; the command line turns each key into a `--<key>` flag.
//!
//! ```no_run
//! use etl_rules::context::Context;
//! use etl_rules::frame::BackendKind;
//! use etl_rules::runner;
//!
//! let mut overrides = Context::new();
//! overrides.insert("csv_file_name", "books_2024.csv");
//! runner::run_file("plan.yml", BackendKind::Polars, &overrides)?;
//! # Ok::<(), etl_rules::error::EtlError>(())
//! ```

use crate::context::Context;
use crate::data::RuleData;
use crate::engine::RuleEngine;
use crate::error::{Result, ResultExt as _};
use crate::frame::{BackendKind, Frame};
use crate::plan::Plan;
use polars::prelude::{DataFrame, LazyFrame};
use serde_json::Value;
use std::path::Path;

/// Read only the context defaults of a plan file, without building any rule.
///
/// # Errors
///
/// I/O failures, malformed YAML and non-scalar context values.
pub fn read_context(path: impl AsRef<Path>) -> Result<Context> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan from {}", path.display()))?;
    context_from_yaml(&contents)
}

fn context_from_yaml(yml: &str) -> Result<Context> {
    let dct: Value = serde_yaml::from_str(yml)?;
    match dct.get("context") {
        None | Some(Value::Null) => Ok(Context::new()),
        Some(context) => Ok(serde_json::from_value(context.clone())?),
    }
}

/// Load a plan file against the backend of `F`.
///
/// # Errors
///
/// Everything [`Plan::from_file`] can return.
pub fn load_plan<F: Frame>(path: impl AsRef<Path>) -> Result<Plan<F>> {
    Plan::from_file(path, F::backend())
}

/// Run `plan` with its context defaults overridden by `overrides`.
///
/// Named inputs that no earlier rule produces are reported as warnings up
/// front; the run itself still fails on the first rule that reads one.
///
/// # Errors
///
/// The first rule failure.
pub fn run_plan<F: Frame>(plan: &Plan<F>, overrides: &Context) -> Result<RuleData<F>> {
    let context = plan.context().merged(overrides);
    tracing::info!(
        plan = plan.name().unwrap_or("<unnamed>"),
        backend = F::BACKEND,
        rules = plan.len(),
        "Running plan..."
    );
    for (key, value) in context.iter() {
        tracing::debug!(key, %value, "context");
    }
    for warning in plan.validate::<&str>(&[]) {
        tracing::warn!("{warning}");
    }

    let mut data = RuleData::new().with_context(context);
    RuleEngine::new(plan).run(&mut data)?;

    let outputs: Vec<&str> = data.get_named_outputs().map(|(name, _)| name).collect();
    tracing::info!(?outputs, main_output = data.get_main_output().is_some(), "Done.");
    Ok(data)
}

/// Load and run a plan file on the chosen backend.
///
/// Results are only observable through the plan's writer rules.
///
/// # Errors
///
/// Loading failures plus everything [`run_plan`] can return.
pub fn run_file(path: impl AsRef<Path>, backend: BackendKind, overrides: &Context) -> Result<()> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), %backend, "Loading plan");
    match backend {
        BackendKind::Polars => {
            let plan = load_plan::<DataFrame>(path)?;
            run_plan(&plan, overrides)?;
        }
        BackendKind::PolarsLazy => {
            let plan = load_plan::<LazyFrame>(path)?;
            run_plan(&plan, overrides)?;
        }
    }
    Ok(())
}
