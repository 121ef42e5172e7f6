//! `etl-rules` command line entry point.
//!
//! ```bash
//! etl-rules --plan plan.yml --backend polars_lazy --csv_file_name books.csv
//! ```
//!
//! Flags after `--plan` and `--backend` come from the plan's `context`
//! section; `etl-rules --plan plan.yml --help` lists them.

#![warn(clippy::all, rust_2018_idioms)]

mod cli;

use anyhow::Result;

fn main() -> Result<()> {
    let invocation = cli::parse()?;
    etl_rules::logging::init(invocation.cli.log_dir.as_deref())?;
    cli::run(&invocation)
}
