//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "MIG_CONFIG";

/// Get the MIG base directory (~/.mig).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".mig"))
}

/// Get the main config file path (`$MIG_CONFIG` or ~/.mig/mig.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(base_dir()?.join("mig.json5"))
}
