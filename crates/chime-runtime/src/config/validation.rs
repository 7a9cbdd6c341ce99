//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotsConfig, ChimeConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ChimeConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bots_config(&config.bots)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid module filter: '{module}'"
        )));
    }

    Ok(())
}

/// Validates bot record directories.
fn validate_bots_config(bots: &BotsConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for dir in &bots.directories {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                "bots.directories cannot contain an empty path",
            ));
        }

        if !seen.insert(dir) {
            return Err(ConfigError::validation(format!(
                "Duplicate bot directory: {}",
                dir.display()
            )));
        }
    }

    Ok(())
}
