//! Runtime error types.

use chime_framework::RegistryError;
use thiserror::Error;

use crate::bot::RegisterError;
use crate::config::ConfigError;
use crate::verify::VerifyError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listener manager could not be built.
    #[error("Failed to build listener manager: {0}")]
    Registry(#[from] RegistryError),

    /// A bot verification record could not be loaded.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// A registrar failed to register a bot.
    #[error("Registrar '{registrar}' failed to register '{record}': {source}")]
    Register {
        registrar: String,
        record: String,
        #[source]
        source: RegisterError,
    },

    /// Waiting for a shutdown signal failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
