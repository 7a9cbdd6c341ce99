//! Error types for the Chime framework.

use std::time::Duration;

use chime_core::Id;
use thiserror::Error;

/// A boxed error returned by handlers and user interceptors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Extraction
// =============================================================================

/// Errors that can occur during handler parameter extraction.
///
/// Extraction failures are not dispatch failures: the listener is skipped.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The event type does not match the expected type.
    #[error("event type mismatch: expected '{expected}', got '{got}'")]
    EventTypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Key of the dispatched event.
        got: &'static str,
    },

    /// The event does not carry the requested piece of data.
    #[error("event carries no {0}")]
    Missing(&'static str),

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Errors returned by registry mutations.
///
/// A failed mutation leaves the current snapshot untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A listener with this id is already registered.
    #[error("duplicate listener id '{0}'")]
    DuplicateListenerId(Id),

    /// An interceptor with this id is already registered.
    #[error("duplicate interceptor id '{0}'")]
    DuplicateInterceptorId(Id),

    /// No listener or interceptor has this id.
    #[error("no listener or interceptor registered under '{0}'")]
    NotFound(Id),
}

/// Errors returned while building listeners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The builder was finished without a handler.
    #[error("listener '{id}' on '{key}' has no handler")]
    IncompleteListener {
        /// Id of the incomplete listener.
        id: Id,
        /// Event key it was declared for.
        key: &'static str,
    },
}

// =============================================================================
// Dispatch
// =============================================================================

/// Errors that abort a single dispatch.
///
/// Handler failures are not dispatch errors; they are recorded as failed
/// listener outcomes.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// An interceptor called `proceed` more than once.
    #[error("interceptor '{interceptor}' proceeded more than once")]
    DoubleProceed {
        /// The offending interceptor.
        interceptor: Id,
    },

    /// No tokio runtime is available for a blocking dispatch.
    #[error("no tokio runtime available for blocking dispatch")]
    NoRuntime,

    /// A blocking dispatch was attempted from inside the async runtime.
    #[error("blocking dispatch called from within an async runtime context")]
    WithinRuntime,

    /// An interceptor aborted the dispatch with its own error.
    #[error("interceptor failed: {0}")]
    Interceptor(#[source] BoxError),
}

impl DispatchError {
    /// Wraps a user error raised by an interceptor.
    pub fn interceptor(err: impl Into<BoxError>) -> Self {
        Self::Interceptor(err.into())
    }
}

// =============================================================================
// Continuous sessions
// =============================================================================

/// Why a continuous session ended without an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session was cancelled or the manager shut down.
    #[error("continuous session '{session}' closed before an event matched")]
    Closed {
        /// The session.
        session: Id,
    },

    /// No matching event arrived in time.
    #[error("continuous session '{session}' timed out after {timeout:?}")]
    Timeout {
        /// The session.
        session: Id,
        /// How long the session waited.
        timeout: Duration,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type for registry mutations.
pub type RegistryResult<T> = Result<T, RegistryError>;
