use anyhow::{Result, bail};
use clap::{Arg, ArgMatches, Command, CommandFactory as _, FromArgMatches as _, Parser, value_parser};
use etl_rules::context::{Context, ContextValue};
use etl_rules::frame::BackendKind;
use etl_rules::runner;
use std::ffi::OsString;
use std::path::PathBuf;

/// Options that do not depend on the plan being run.
///
/// Every key in the plan's `context` section is added on top of these as a
/// `--<key>` flag, typed after its default value.
#[derive(Debug, Parser)]
#[command(name = "etl-rules", version, about = "Run a declarative ETL plan")]
pub struct Cli {
    /// Path to the YAML plan file
    #[arg(short, long)]
    pub plan: PathBuf,

    /// Backend executing the plan
    #[arg(short, long, env = "ETL_RULES_BACKEND", value_enum, default_value_t)]
    pub backend: BackendKind,

    /// Also write daily log files into this directory
    #[arg(long, env = "ETL_RULES_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

/// A parsed command line: the fixed options plus context overrides.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    pub overrides: Context,
}

const RESERVED: &[&str] = &["plan", "backend", "log-dir", "help", "version"];

/// Parse the process arguments, exiting with usage on bad input.
pub fn parse() -> Result<Invocation> {
    match try_parse_from(std::env::args_os()) {
        Err(err) => match err.downcast::<clap::Error>() {
            Ok(usage) => usage.exit(),
            Err(err) => Err(err),
        },
        parsed => parsed,
    }
}

/// Parse `args` in two passes: find the plan, then parse everything against
/// a command extended with the plan's context flags.
pub fn try_parse_from<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let defaults = match plan_path(&args) {
        Some(path) => runner::read_context(path)?,
        None => Context::new(),
    };
    let matches = command_for(&defaults)?.try_get_matches_from(&args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    Ok(Invocation {
        cli,
        overrides: overrides_from(&matches, &defaults),
    })
}

/// The plan path, found without a full parse.
fn plan_path(args: &[OsString]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let arg = arg.to_string_lossy();
        if arg == "-p" || arg == "--plan" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--plan=") {
            return Some(PathBuf::from(path));
        }
        if let Some(path) = arg.strip_prefix("-p").filter(|rest| !rest.is_empty() && !arg.starts_with("--")) {
            return Some(PathBuf::from(path.trim_start_matches('=')));
        }
    }
    None
}

/// [`Cli`] plus one flag per context key.
fn command_for(defaults: &Context) -> Result<Command> {
    let mut cmd = Cli::command();
    for (key, value) in defaults.iter() {
        if RESERVED.contains(&key) {
            bail!("Context key '{key}' clashes with a built-in option");
        }
        let arg = Arg::new(key.to_owned())
            .long(key.to_owned())
            .help(format!("Plan context parameter (default: {value})"));
        cmd = cmd.arg(match value {
            ContextValue::Int(_) => arg.value_parser(value_parser!(i64)),
            ContextValue::Float(_) => arg.value_parser(value_parser!(f64)),
            ContextValue::Str(_) => arg.value_parser(value_parser!(String)),
        });
    }
    Ok(cmd)
}

fn overrides_from(matches: &ArgMatches, defaults: &Context) -> Context {
    defaults
        .iter()
        .filter_map(|(key, default)| {
            let value = match default {
                ContextValue::Int(_) => matches.get_one::<i64>(key).copied().map(ContextValue::Int),
                ContextValue::Float(_) => matches.get_one::<f64>(key).copied().map(ContextValue::Float),
                ContextValue::Str(_) => matches.get_one::<String>(key).cloned().map(ContextValue::Str),
            };
            value.map(|value| (key, value))
        })
        .collect()
}

pub fn run(invocation: &Invocation) -> Result<()> {
    let cli = &invocation.cli;
    runner::run_file(&cli.plan, cli.backend, &invocation.overrides)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn plan_file(test: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("etl_rules_cli_{test}_{}.yml", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_path_forms() {
        let find = |args: &[&str]| plan_path(&args.iter().map(OsString::from).collect::<Vec<_>>());
        assert_eq!(find(&["etl-rules", "-p", "a.yml"]), Some(PathBuf::from("a.yml")));
        assert_eq!(find(&["etl-rules", "--plan", "a.yml"]), Some(PathBuf::from("a.yml")));
        assert_eq!(find(&["etl-rules", "--plan=a.yml"]), Some(PathBuf::from("a.yml")));
        assert_eq!(find(&["etl-rules", "-pa.yml"]), Some(PathBuf::from("a.yml")));
        assert_eq!(find(&["etl-rules", "-b", "polars"]), None);
    }

    #[test]
    fn test_context_flags_are_typed() -> Result<()> {
        let plan = plan_file(
            "typed",
            "context:\n  file_name: a.csv\n  limit: 10\n  ratio: 0.5\nrules: []\n",
        );
        let plan_arg = plan.to_string_lossy().into_owned();

        let parsed = try_parse_from(["etl-rules", "-p", &plan_arg, "--limit", "25", "--file_name", "b.csv"])?;
        assert_eq!(parsed.cli.plan, plan);
        assert_eq!(parsed.overrides.len(), 2);
        assert_eq!(parsed.overrides.get("limit"), Some(&ContextValue::Int(25)));
        assert_eq!(parsed.overrides.get("file_name"), Some(&ContextValue::Str("b.csv".to_owned())));
        assert_eq!(parsed.overrides.get("ratio"), None);

        assert!(try_parse_from(["etl-rules", "-p", &plan_arg, "--limit", "many"]).is_err());
        assert!(try_parse_from(["etl-rules", "-p", &plan_arg, "--unknown", "1"]).is_err());
        Ok(())
    }

    #[test]
    fn test_backend_flag() -> Result<()> {
        let plan = plan_file("backend", "rules: []\n");
        let plan_arg = plan.to_string_lossy().into_owned();
        let parsed = try_parse_from(["etl-rules", "--plan", &plan_arg, "--backend", "polars_lazy"])?;
        assert_eq!(parsed.cli.backend, BackendKind::PolarsLazy);
        assert!(parsed.overrides.is_empty());
        assert!(try_parse_from(["etl-rules", "--plan", &plan_arg, "-b", "pandas"]).is_err());
        Ok(())
    }

    #[test]
    fn test_reserved_context_key() {
        let plan = plan_file("reserved", "context:\n  backend: x\n");
        let plan_arg = plan.to_string_lossy().into_owned();
        assert!(try_parse_from(["etl-rules", "-p", &plan_arg]).is_err());
    }

    #[test]
    fn test_plan_is_required() {
        assert!(try_parse_from(["etl-rules"]).is_err());
    }
}
