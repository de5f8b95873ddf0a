//! Logging setup
//!
//! Library code logs through the `log` facade and the engine through
//! `tracing`; both end up in a single tracing-subscriber fmt layer writing to
//! stderr and, when a log directory is configured, to a log file as well.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Default log file name inside `log_dir`.
pub const DEFAULT_LOG_FILE: &str = "seismic_psd.log";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`
    pub level: String,
    /// Directory receiving a copy of the log output
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level
            .parse::<LevelFilter>()
            .map_err(|err| anyhow!("invalid log level '{}': {}", self.level, err))
    }
}

/// Install the global subscriber
///
/// Returns an error when the level is unknown or the log file cannot be
/// opened. A subscriber installed earlier (tests, embedding applications)
/// is left in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = config.level_filter()?;

    let writer = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(&config.file_name);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            BoxMakeWriter::new(std::io::stderr.and(Arc::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_target(true)
        .try_init();

    if installed.is_ok() {
        log::info!("Logging system initialized at level {}", level);
    }
    Ok(())
}
