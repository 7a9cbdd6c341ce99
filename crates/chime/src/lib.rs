//! # Chime
//!
//! A multi-platform bot framework built around a typed event dispatch core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────────────────┐
//! │  Connector  │────▶│ ListenerManager │────▶│ processing interceptors      │
//! │ (platform)  │     │                 │     │   └─▶ listener "a" (prio 0)  │──▶ results
//! └─────────────┘     └─────────────────┘     │   └─▶ listener "b" (prio 10) │──▶ results
//!                                             └──────────────────────────────┘
//! ```
//!
//! - **Core**: ids, messages and the event hierarchy
//! - **Framework**: listeners, interceptors and the listener manager
//! - **Runtime**: configuration, logging and bot registration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> RuntimeResult<()> {
//!     let listeners = ListenersGenerator::new()
//!         .listen(&MESSAGE, |l| {
//!             l.id(Id::literal("echo").unwrap())
//!                 .handle(|msg: EventOf<MessageEvent>| async move { msg.message.plain_text() })
//!         })?;
//!
//!     let runtime = ChimeRuntime::builder()
//!         .manager(ManagerConfiguration::new().listeners(listeners))
//!         .build()?;
//!     runtime.run().await
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration and bot records (default)
//! - `yaml-config`: YAML configuration and bot records
//! - `json-log`: JSON log output

pub use chime_core as core;
pub use chime_framework as framework;
pub use chime_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use chime::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use chime_runtime::{
        BotRegistrar, BotVerifyInfo, ChimeConfig, ChimeRuntime, RegisterError, RuntimeError,
        RuntimeResult,
    };

    // Core model
    pub use chime_core::{
        BoxedEvent, Event, EventKey, Id, Message, MessageSegment, Priority, Segment,
    };

    // Listeners
    pub use chime_framework::{
        EventResult, InvokeMode, ListenerBuilder, ListenerManager, ListenersGenerator,
        ManagerConfiguration, blocking_handler, listener,
    };

    // Extractors - for handler parameters
    pub use chime_framework::{BotId, EventContext, EventOf, FromContext, ListenerContext};

    // Scopes and continuous sessions
    pub use chime_framework::{Attributes, ContinuousSession, ContinuousSessions, SessionError};

    // Interceptors
    pub use chime_framework::{
        Chain, InterceptPoint, InterceptorsGenerator, ListenerChain, ListenerInterceptor,
        ProcessingChain, ProcessingInterceptor, interceptor_fn, listener_fn, processing_fn,
    };
}
