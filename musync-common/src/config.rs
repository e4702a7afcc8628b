//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "musync";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "musync.toml";

/// Logging configuration (`[logging]` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error, or `musync_engine=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Value from the TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// Config file resolution: CLI argument, then environment, then the platform default
///
/// Returns `None` when nothing was given and the default file does not exist,
/// meaning built-in defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/musync (or /var/lib/musync for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib/musync"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/musync
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/musync"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\musync"))
    } else {
        PathBuf::from("./musync_data")
    }
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Read TOML failed for {}: {}", path.display(), e))
    })?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed for {}: {}", path.display(), e)))
}

/// Serialize `value` and write it atomically, owner-only on Unix
///
/// Config files may carry provider tokens, hence the 0600 permissions.
pub fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    crate::fs::atomic_write(path, content.as_bytes())?;
    crate::fs::set_owner_only(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_defaults() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert!(logging.file.is_none());
    }

    #[test]
    fn test_cli_argument_wins() {
        let cli = PathBuf::from("/from/cli");
        let cfg = PathBuf::from("/from/config");
        let resolved =
            resolve_root_folder(Some(&cli), "MUSYNC_TEST_UNSET_VARIABLE", Some(&cfg));
        assert_eq!(resolved, cli);
    }

    #[test]
    fn test_config_value_used_without_cli_or_env() {
        let cfg = PathBuf::from("/from/config");
        let resolved = resolve_root_folder(None, "MUSYNC_TEST_UNSET_VARIABLE", Some(&cfg));
        assert_eq!(resolved, cfg);
    }

    #[test]
    fn test_default_root_folder_mentions_app_dir() {
        let root = default_root_folder();
        assert!(root.to_string_lossy().contains("musync"));
    }
}
