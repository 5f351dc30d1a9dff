//! Configuration validation.

use crate::schema::SandboxConfig;
use sandbox_common::ConfigError;

const MAX_READ_CHUNK: usize = 1 << 20;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &SandboxConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    if config.images.base_image.trim().is_empty() {
        errors.push("images.base_image must not be empty".into());
    }
    for (i, image) in config.images.privileged.iter().enumerate() {
        if image.trim().is_empty() {
            errors.push(format!("images.privileged[{i}] must not be empty"));
        }
    }

    validate_range(&mut errors, "terminal.read_chunk", config.terminal.read_chunk, 1, MAX_READ_CHUNK);
    validate_range(&mut errors, "events.capacity", config.events.capacity, 1, usize::MAX / 2);

    if config.transfer.cwd_command.is_empty() {
        errors.push("transfer.cwd_command must not be empty".into());
    }
    if config.transfer.download_timeout_secs == 0 {
        errors.push("transfer.download_timeout_secs must be positive".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_range(errors: &mut Vec<String>, name: &str, value: usize, min: usize, max: usize) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}
