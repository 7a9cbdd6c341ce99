//! Error types for the Chime core data model.
//!
//! Dispatch and registry errors live in `chime-framework`; this module only
//! covers identifier construction and message (de)serialization.

use thiserror::Error;

// =============================================================================
// Identifier Errors
// =============================================================================

/// Errors that can occur when constructing an [`Id`](crate::Id).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The literal value was empty or contained only whitespace.
    #[error("invalid identifier literal: {reason}")]
    Invalid {
        /// Why the value was rejected.
        reason: &'static str,
    },
}

// =============================================================================
// Message Errors
// =============================================================================

/// Errors produced while converting a [`Message`](crate::Message) to or from JSON.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The JSON document did not describe a valid message: unknown segment
    /// discriminator, missing field, or a field of the wrong shape.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for identifier construction.
pub type IdResult<T> = Result<T, IdError>;

/// Result type for message conversion.
pub type MessageResult<T> = Result<T, MessageError>;
