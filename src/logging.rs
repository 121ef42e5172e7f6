//! Logging setup for the `etl-rules` binary.
//!
//! Logs always go to stderr. With a log directory, they are also written to
//! daily rotated files:
//!
//! - `etl-rules.<date>.log`: everything the filter lets through
//! - `etl-rules-error.<date>.log`: warnings and errors only
//!
//! The level defaults to `info` and follows `RUST_LOG` when set.
//!
//! ```no_run
//! etl_rules::logging::init(None).expect("Failed to initialize logging");
//! tracing::info!("plan started");
//! ```

use anyhow::{Context as _, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const MAX_LOG_FILES: usize = 10;

fn appender(log_dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} file appender"))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns error if the log directory cannot be created, a file appender
/// fails, or a subscriber is already installed.
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let (all_logs_layer, error_logs_layer) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let all_logs = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false)
                .with_writer(appender(dir, "etl-rules")?);
            let error_logs = fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false)
                .with_writer(appender(dir, "etl-rules-error")?)
                .with_filter(LevelFilter::WARN);
            (Some(all_logs), Some(error_logs))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install the log subscriber")?;

    if let Some(dir) = log_dir {
        tracing::debug!("Logging initialized, log directory: {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_dir_once() {
        let dir = std::env::temp_dir().join(format!("etl_rules_logs_{}", std::process::id()));
        init(Some(&dir)).expect("first init succeeds");
        assert!(dir.is_dir());
        assert!(init(None).is_err());
    }
}
