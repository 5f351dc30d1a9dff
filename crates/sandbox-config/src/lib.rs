//! Sandbox configuration.
//!
//! TOML-based configuration for the instance manager. Every section has
//! defaults, so an empty file (or no file at all) yields a working setup.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    EventsConfig, ImagesConfig, SandboxConfig, TerminalConfig, TransferConfig,
    DEFAULT_BASE_IMAGE,
};
pub use toml_loader::{default_config_path, load_from_path, load_from_str};

use sandbox_common::ConfigError;

/// Load config from the platform default path, falling back to defaults
/// when no file exists there.
pub fn load_config() -> Result<SandboxConfig, ConfigError> {
    toml_loader::load_default()
}
