//! TOML config file loading.

use crate::schema::SandboxConfig;
use crate::validation;
use sandbox_common::ConfigError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load config from a specific TOML file path.
///
/// Missing fields take their defaults. The result is validated before it
/// is returned.
pub fn load_from_path(path: &Path) -> Result<SandboxConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config = load_from_str(&content)?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Parse and validate config from a TOML string.
pub fn load_from_str(content: &str) -> Result<SandboxConfig, ConfigError> {
    let config: SandboxConfig = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    validation::validate(&config)?;
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On Linux: `~/.config/sandbox/config.toml`. A missing file means
/// defaults; nothing is written to disk.
pub fn load_default() -> Result<SandboxConfig, ConfigError> {
    let path = default_config_path()?;

    if !path.exists() {
        info!("no config found at {}, using defaults", path.display());
        return Ok(SandboxConfig::default());
    }

    load_from_path(&path)
}

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        ConfigError::ParseError("could not determine config directory".into())
    })?;
    Ok(config_dir.join("sandbox").join("config.toml"))
}
