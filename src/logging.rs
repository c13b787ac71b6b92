use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{Result, ServerError};

/// Environment variable overriding the configured filter.
pub const LOG_ENV: &str = "PREFORK_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    /// Something that should never happen; logged at error.
    Crazy,
}

impl LogLevel {
    pub fn filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Crazy => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for daily `YYYY-MM-DD.log` files; stdout only when unset.
    pub dir: Option<PathBuf>,
    pub level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: LogLevel::Info,
        }
    }
}

/// Installs the global subscriber.
///
/// The file writer is synchronous, with no background thread, so it keeps
/// working in forked workers.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(config.level.filter().into())
            .with_env_var(LOG_ENV)
            .from_env_lossy()
    };

    let stdout = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_filter(filter());

    let file = match &config.dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| ServerError::Logging(format!("{}: {e}", dir.display())))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout)
        .with(file)
        .try_init()
        .map_err(|e| ServerError::Logging(e.to_string()))
}

/// Logs one message at `level`.
pub fn record(message: &str, level: LogLevel) {
    match level {
        LogLevel::Debug => debug!("{message}"),
        LogLevel::Info => info!("{message}"),
        LogLevel::Warn => warn!("{message}"),
        LogLevel::Error => error!("{message}"),
        LogLevel::Crazy => error!(crazy = true, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_deserialize() {
        let config: LogConfig = serde_yaml::from_str("level: crazy\ndir: /var/log/prefork").unwrap();
        assert_eq!(config.level, LogLevel::Crazy);
        assert_eq!(config.level.filter(), LevelFilter::ERROR);
        assert_eq!(config.dir, Some(PathBuf::from("/var/log/prefork")));
    }

    #[test]
    fn defaults_to_info_on_stdout() {
        let config = LogConfig::default();
        assert_eq!(config.level.filter(), LevelFilter::INFO);
        assert!(config.dir.is_none());
    }
}
