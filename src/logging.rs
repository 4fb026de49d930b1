//! tracing-subscriber setup for the `char3` binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVE: &str = "char3_dashboard=info";
const VERBOSE_DIRECTIVE: &str = "char3_dashboard=debug,tower_http=debug";
const LOG_FILE_PREFIX: &str = "char3.log";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub json: bool,
    /// Daily-rolling file output instead of stderr.
    pub dir: Option<PathBuf>,
}

/// `RUST_LOG` wins over the built-in default.
pub fn build_filter(verbose: bool, rust_log: Option<&str>) -> Result<EnvFilter> {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid RUST_LOG '{}'", directives)),
        None if verbose => Ok(EnvFilter::new(VERBOSE_DIRECTIVE)),
        None => Ok(EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(options.verbose, rust_log.as_deref())?;

    let (writer, guard) = match &options.dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            (writer, Some(guard))
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (writer, Some(guard))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(options.dir.is_none());
    let installed = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;
    Ok(guard)
}

fn file_writer(dir: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}
