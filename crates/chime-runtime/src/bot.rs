//! Bot registration.
//!
//! Platform integrations implement [`BotRegistrar`]. The runtime offers every
//! loaded [`BotVerifyInfo`] to the registrars in registration order; the first
//! one that accepts the record's component registers the bot.

use std::fmt;

use async_trait::async_trait;
use chime_core::Id;
use chime_framework::BoxError;
use thiserror::Error;

use crate::verify::BotVerifyInfo;

/// Why a registrar did not register a bot.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The record belongs to another component. The next registrar is tried.
    #[error("component mismatch: expected '{expected}', got '{got}'")]
    ComponentMismatch { expected: String, got: String },

    /// The registrar accepted the record but failed to register it.
    #[error("registration failed: {0}")]
    Failed(#[source] BoxError),
}

impl RegisterError {
    /// Creates a component mismatch error.
    pub fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ComponentMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Wraps a registrar failure.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}

/// Registers bots from verification records.
#[async_trait]
pub trait BotRegistrar: Send + Sync {
    /// Registrar name, for logs.
    fn name(&self) -> &str;

    /// Registers the bot described by `info` and returns its id.
    ///
    /// Return [`RegisterError::ComponentMismatch`] for records of other
    /// components.
    async fn register(&self, info: &BotVerifyInfo) -> Result<Id, RegisterError>;
}

/// A bot registered by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredBot {
    /// Id returned by the registrar.
    pub id: Id,
    /// Component of the record.
    pub component: String,
    /// Name of the record.
    pub record: String,
    /// Name of the registrar that accepted the record.
    pub registrar: String,
}

impl fmt::Display for RegisteredBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bot(component={}, id={}) via {}",
            self.component, self.id, self.registrar
        )
    }
}
