//! Tracing subscriber setup.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | `ragmem=info,...` | Standard env filter |
//! | `LOG_FORMAT` | `text` | `json` or `text` |
//! | `LOG_FILE` | unset | Path of a daily-rotated log file; stderr when unset |
//! | `LOG_ANSI` | auto | Force ANSI colors on or off |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragmem_core::{env, Error, Result};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str =
    "ragmem=info,ragmem_service=info,ragmem_jobs=info,ragmem_search=info,ragmem_inference=info,ragmem_db=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    /// `None` lets the subscriber decide (on for terminals, off for files).
    pub ansi: Option<bool>,
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            ansi: None,
            default_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Result<Self> {
        let ansi = match env::var("LOG_ANSI") {
            Some(_) => Some(env::flag_or("LOG_ANSI", false)?),
            None => None,
        };
        Ok(Self {
            format: env::parse_or("LOG_FORMAT", LogFormat::default())?,
            file: env::var("LOG_FILE").map(PathBuf::from),
            ansi,
            default_filter: DEFAULT_LOG_FILTER.to_string(),
        })
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// stops the file writer.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("ragmem.log");
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let installed = match config.format {
                LogFormat::Json => registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .try_init(),
                LogFormat::Text => registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(writer)
                            .with_ansi(config.ansi.unwrap_or(false)),
                    )
                    .try_init(),
            };
            installed.map_err(|e| Error::Internal(format!("failed to install subscriber: {}", e)))?;
            Some(guard)
        }
        None => {
            let installed = match config.format {
                LogFormat::Json => registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(std::io::stderr),
                    )
                    .try_init(),
                LogFormat::Text => {
                    let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
                    if let Some(ansi) = config.ansi {
                        layer = layer.with_ansi(ansi);
                    }
                    registry.with(layer).try_init()
                }
            };
            installed.map_err(|e| Error::Internal(format!("failed to install subscriber: {}", e)))?;
            None
        }
    };

    info!(
        subsystem = "service",
        component = "telemetry",
        log_format = %config.format,
        log_file = config
            .file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(stderr)".to_string()),
        "Logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.file.is_none());
        assert!(config.ansi.is_none());
        assert!(config.default_filter.contains("ragmem_service=info"));
    }

    #[test]
    fn test_file_logging_returns_guard() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            format: LogFormat::Json,
            file: Some(dir.path().join("ragmem.log")),
            ..LogConfig::default()
        };
        // Another test may already own the global subscriber.
        if let Ok(guard) = init_tracing(&config) {
            assert!(guard.is_some());
        }
    }
}
