//! # etl-rules - Declarative ETL plans over polars
//!
//! Transformations on tabular data are written as a sequence of rules
//! (rename, filter, join, aggregate, string and datetime manipulation, type
//! conversion, file I/O). A sequence of rules is a [`plan::Plan`], which
//! serializes to YAML and replays unchanged against either shipped backend.
//!
//! ## Quick Start
//!
//! ```no_run
//! use etl_rules::data::RuleData;
//! use etl_rules::engine::RuleEngine;
//! use etl_rules::frame::Frame as _;
//! use etl_rules::plan::Plan;
//! use etl_rules::rules::basic::{RenameRule, SortRule};
//! use polars::prelude::*;
//!
//! let mut plan: Plan<DataFrame> = Plan::new().with_name("tidy");
//! plan.add_rule(RenameRule::new([("A", "id")]))?;
//! plan.add_rule(SortRule::new(["id"])?)?;
//!
//! // Save and reload against the lazy backend
//! let yml = plan.to_yaml()?;
//! let lazy_plan = Plan::from_yaml(&yml, LazyFrame::backend())?;
//!
//! let mut data = RuleData::new().with_main_input(df!("A" => [3, 1, 2])?);
//! RuleEngine::new(&plan).run(&mut data)?;
//! # let _ = lazy_plan;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`data`]: the run's data context, one main table plus named tables
//! - [`rule`]: the rule contract and its dict/YAML form
//! - [`block`]: rules grouped behind their own named-output namespace
//! - [`plan`]: ordered rules with a single execution mode
//! - [`engine`]: runs a plan over a data context
//! - [`backend`]: rule registries used when deserializing
//! - [`frame`]: the polars table types and their backends
//! - [`rules`]: the rule library
//! - [`runner`]: loading and running plan files
//!
//! ## Execution Modes
//!
//! A plan is either a **pipeline** (every rule reads and writes the main
//! output) or a **graph** (rules pass tables by name). Mixing the two is
//! rejected as rules are added. Writers produce nothing and fit either mode.

#![warn(clippy::all, rust_2018_idioms)]

pub mod backend;
pub mod block;
pub mod context;
pub mod data;
pub mod engine;
pub mod error;
pub mod frame;
pub mod logging;
pub mod plan;
pub mod rule;
pub mod rules;
pub mod runner;

#[cfg(test)]
mod test_support;
