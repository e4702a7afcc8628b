//! Tracing initialisation shared by musync binaries

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins over the configured level
pub fn build_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&logging.level)
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", logging.level, e)))
}

/// Install the global tracing subscriber
///
/// Logs go to stderr, or to `logging.file` (appended, no ANSI colours).
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = build_filter(logging)?;

    let result = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|e| Error::Internal(format!("Tracing already initialised: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_invalid_level_is_config_error() {
        std::env::remove_var("RUST_LOG");
        let logging = LoggingConfig {
            level: "musync=[[[".to_string(),
            file: None,
        };
        assert!(matches!(build_filter(&logging), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_directive_level_accepted() {
        std::env::remove_var("RUST_LOG");
        let logging = LoggingConfig {
            level: "musync_engine=debug,warn".to_string(),
            file: None,
        };
        assert!(build_filter(&logging).is_ok());
    }
}
