//! # Chime Framework
//!
//! Listener registry, interceptor chains and event dispatch for bot
//! applications.
//!
//! This layer provides:
//! - [`ListenerManager`]: the registry of listeners and interceptors, and the
//!   dispatch entry point
//! - [`ListenerBuilder`] and [`ListenersGenerator`]: the listener DSL
//! - Axum-style [`Handler`]s with [`FromContext`] parameter extraction
//! - Processing and listener [`Interceptor`] chains
//! - [`ManagerConfiguration`] for building a manager in one step
//! - [`ContinuousSessions`] for handlers waiting on a later event
//!
//! Everything here is platform agnostic. Platform integrations define their
//! own events on top of [`chime_core::Event`] and feed them to
//! [`ListenerManager::dispatch`].

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod interceptor;
pub mod listener;
pub mod manager;
pub mod result;
pub mod session;

pub use builder::{ListenerBuilder, ListenersGenerator, listener};
pub use config::{DispatchSettings, ExceptionHandler, InterceptorsGenerator, ManagerConfiguration};
pub use context::{Attributes, EventContext, ListenerContext};
pub use error::{
    BoxError, BuildError, DispatchError, ExtractError, ExtractResult, RegistryError,
    RegistryResult, SessionError,
};
pub use extractor::{BotId, EventOf, FromContext};
pub use handler::{BoxedHandler, ErasedHandler, Handler, HandlerFn, blocking_handler, into_handler};
pub use interceptor::{
    Chain, InterceptPoint, Interceptor, InterceptorEntry, InterceptorFn, ListenerChain,
    ListenerInterceptor, ListenerInterceptorEntry, ProcessingChain, ProcessingInterceptor,
    interceptor_fn, listener_fn, processing_fn,
};
pub use listener::{Filter, InvokeMode, Listener};
pub use manager::{ListenerManager, Unregistered};
pub use result::{
    AsyncHandle, DispatchResult, EventResult, IntoEventResult, ListenerFailure, ListenerOutcome,
};
pub use session::{ContinuousSession, ContinuousSessions};
