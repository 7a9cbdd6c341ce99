//! Chime Runtime - Orchestration layer for the Chime bot framework.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`, `ChimeConfig`)
//! - Logging setup (`LoggingBuilder`)
//! - Bot verification records (`VerifyInfoLoader`, `BotVerifyInfo`)
//! - Bot registration (`BotRegistrar`)
//! - Runtime orchestration (`ChimeRuntime`)
//!
//! ```ignore
//! use chime_runtime::ChimeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> chime_runtime::RuntimeResult<()> {
//!     let runtime = ChimeRuntime::builder().build()?;
//!
//!     // Registrars turn `*.bot.*` records into bots.
//!     runtime.register_registrar(MyRegistrar::new()).await;
//!
//!     // Loads bots, then runs until Ctrl+C.
//!     runtime.run().await
//! }
//! ```
//!
//! # Bot Records
//!
//! Each file under the configured `bots.directories` whose name ends in
//! `.bot.json`, `.bot.toml` (feature `toml-config`) or `.bot.yaml`
//! (feature `yaml-config`) describes one bot. The `component` field selects
//! the registrar; the rest is left to it.

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod verify;

// Re-exports
pub use bot::{BotRegistrar, RegisterError, RegisteredBot};
pub use config::{
    BotsConfig, ChimeConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, Profile,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{ChimeRuntime, RuntimeBuilder};
pub use verify::{BotVerifyInfo, VerifyError, VerifyInfoDecoder, VerifyInfoLoader, VerifyResult};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
