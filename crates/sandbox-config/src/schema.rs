//! Configuration types.

use serde::{Deserialize, Serialize};

/// Image used when a create request names none.
pub const DEFAULT_BASE_IMAGE: &str = "franela/dind";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub images: ImagesConfig,
    pub terminal: TerminalConfig,
    pub events: EventsConfig,
    pub transfer: TransferConfig,
}

/// Image selection and the privileged allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Image used when the caller does not name one.
    pub base_image: String,
    /// Extra images that run with elevated capability. The base image is
    /// always allowed in addition to these.
    pub privileged: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            privileged: vec![
                "franela/dind:overlay2-dev".to_string(),
                "franela/ucp:2.4.1".to_string(),
            ],
        }
    }
}

impl ImagesConfig {
    /// Full allow-list: the base image followed by the configured extras,
    /// without duplicates.
    pub fn allowed(&self) -> Vec<String> {
        let mut allowed = vec![self.base_image.clone()];
        for image in &self.privileged {
            if !allowed.contains(image) {
                allowed.push(image.clone());
            }
        }
        allowed
    }
}

/// Terminal relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Maximum bytes read from an attach channel per relay iteration.
    pub read_chunk: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { read_chunk: 8_192 }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events queued per subscriber before publishers wait.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 1_024 }
    }
}

/// File transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Command run inside an instance to print its shell's working
    /// directory as `pid: /path`.
    pub cwd_command: Vec<String>,
    /// Overall timeout for remote downloads, in seconds.
    pub download_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            cwd_command: vec![
                "bash".to_string(),
                "-c".to_string(),
                "pwdx $(</var/run/cwd)".to_string(),
            ],
            download_timeout_secs: 300,
        }
    }
}
