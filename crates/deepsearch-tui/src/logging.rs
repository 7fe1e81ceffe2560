use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "DEEPSEARCH_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
    Pretty,
}

/// Where the log file lives. The terminal belongs to the UI, so nothing is
/// written to stdout or stderr.
pub fn log_path() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("deepsearch").join("deepsearch.log"))
}

/// Build the filter: `DEEPSEARCH_LOG` wins, then the configured level, then `info`.
fn build_filter(default_level: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    let level = default_level.unwrap_or("info");
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{}'", level))
}

pub fn init(format: LogFormat, default_level: Option<&str>) -> Result<PathBuf> {
    let path = log_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = build_filter(default_level)?;
    let writer = Mutex::new(file);

    let installed = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    Ok(path)
}
