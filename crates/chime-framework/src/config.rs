//! Manager configuration.
//!
//! [`ManagerConfiguration`] collects listeners, interceptors and dispatch
//! settings, and builds a [`ListenerManager`] in one step:
//!
//! ```rust,ignore
//! let manager = ManagerConfiguration::new()
//!     .listeners(
//!         ListenersGenerator::new()
//!             .listen(&PING, |b| b.handle(|| async { "pong" }))?,
//!     )
//!     .interceptors(
//!         InterceptorsGenerator::new()
//!             .processing(Id::literal("audit")?, Priority::FIRST, Audit),
//!     )
//!     .exception_handler(|_ctx, failure| {
//!         tracing::error!(%failure, "listener failed");
//!         EventResult::Invalid
//!     })
//!     .build()?;
//! ```

use std::sync::Arc;

use chime_core::{Id, Priority};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::builder::ListenersGenerator;
use crate::context::{EventContext, ListenerContext};
use crate::error::RegistryResult;
use crate::interceptor::{InterceptPoint, Interceptor};
use crate::listener::Listener;
use crate::manager::ListenerManager;
use crate::result::{DispatchResult, EventResult, ListenerFailure};

/// Called with every failed listener result. The returned value is recorded
/// instead of the failure; return [`EventResult::Invalid`] to drop it.
pub type ExceptionHandler =
    Arc<dyn Fn(&ListenerContext, &ListenerFailure) -> EventResult + Send + Sync>;

/// Dispatch behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Convert handler panics into failed results instead of unwinding
    /// through the dispatch.
    pub catch_panics: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { catch_panics: true }
    }
}

enum InterceptorSpec {
    Processing {
        id: Id,
        priority: Priority,
        interceptor: Arc<dyn Interceptor<EventContext, DispatchResult>>,
    },
    Listener {
        id: Id,
        priority: Priority,
        point: InterceptPoint,
        interceptor: Arc<dyn Interceptor<ListenerContext, EventResult>>,
    },
}

/// Collects processing and global listener interceptors.
#[derive(Default)]
pub struct InterceptorsGenerator {
    specs: Vec<InterceptorSpec>,
}

impl InterceptorsGenerator {
    /// Creates an empty generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a processing interceptor.
    pub fn processing<I>(mut self, id: Id, priority: impl Into<Priority>, interceptor: I) -> Self
    where
        I: Interceptor<EventContext, DispatchResult>,
    {
        self.specs.push(InterceptorSpec::Processing {
            id,
            priority: priority.into(),
            interceptor: Arc::new(interceptor),
        });
        self
    }

    /// Adds a listener interceptor applied to every listener.
    pub fn listener<I>(
        mut self,
        id: Id,
        priority: impl Into<Priority>,
        point: InterceptPoint,
        interceptor: I,
    ) -> Self
    where
        I: Interceptor<ListenerContext, EventResult>,
    {
        self.specs.push(InterceptorSpec::Listener {
            id,
            priority: priority.into(),
            point,
            interceptor: Arc::new(interceptor),
        });
        self
    }

    /// Number of collected interceptors.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if no interceptor was collected.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Builder for a [`ListenerManager`].
#[derive(Default)]
pub struct ManagerConfiguration {
    listeners: Vec<Listener>,
    interceptors: Vec<InterceptorSpec>,
    exception_handler: Option<ExceptionHandler>,
    settings: DispatchSettings,
    runtime: Option<Handle>,
}

impl ManagerConfiguration {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every listener of `generator`.
    pub fn listeners(mut self, generator: ListenersGenerator) -> Self {
        self.listeners.extend(generator.into_listeners());
        self
    }

    /// Adds one listener.
    pub fn add_listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Adds every interceptor of `generator`.
    pub fn interceptors(mut self, generator: InterceptorsGenerator) -> Self {
        self.interceptors.extend(generator.specs);
        self
    }

    /// Sets the exception handler.
    pub fn exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ListenerContext, &ListenerFailure) -> EventResult + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Sets the dispatch settings.
    pub fn settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the runtime used by
    /// [`dispatch_blocking`](ListenerManager::dispatch_blocking).
    ///
    /// Defaults to the runtime `build` is called in, if any.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds the manager. Fails on the first duplicate id.
    pub fn build(self) -> RegistryResult<ListenerManager> {
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        let manager = ListenerManager::with_parts(self.settings, self.exception_handler, runtime);

        for spec in self.interceptors {
            match spec {
                InterceptorSpec::Processing {
                    id,
                    priority,
                    interceptor,
                } => manager.add_processing_interceptor_arc(id, priority, interceptor)?,
                InterceptorSpec::Listener {
                    id,
                    priority,
                    point,
                    interceptor,
                } => manager.add_listener_interceptor_arc(id, priority, point, interceptor)?,
            }
        }
        manager.register_all(self.listeners)?;
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::listener;
    use crate::error::RegistryError;
    use crate::interceptor::{ListenerChain, ProcessingChain, listener_fn, processing_fn};
    use chime_core::EventKey;

    static PING: EventKey = EventKey::root("ping");

    #[test]
    fn test_settings_defaults_and_serde() {
        assert!(DispatchSettings::default().catch_panics);

        let parsed: DispatchSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, DispatchSettings::default());

        let parsed: DispatchSettings =
            serde_json::from_str(r#"{"catch_panics": false}"#).unwrap();
        assert!(!parsed.catch_panics);
    }

    #[test]
    fn test_build_registers_everything() {
        let interceptors = InterceptorsGenerator::new()
            .processing(
                Id::literal("p").unwrap(),
                Priority::FIRST,
                processing_fn(|chain: &mut ProcessingChain<'_>| {
                    Box::pin(async move { chain.proceed().await })
                }),
            )
            .listener(
                Id::literal("l").unwrap(),
                1,
                InterceptPoint::AfterMatch,
                listener_fn(|chain: &mut ListenerChain<'_>| {
                    Box::pin(async move { chain.proceed().await })
                }),
            );
        assert_eq!(interceptors.len(), 2);

        let manager = ManagerConfiguration::new()
            .listeners(ListenersGenerator::new().add(listener(&PING, || async {})))
            .add_listener(listener(&PING, || async {}))
            .interceptors(interceptors)
            .settings(DispatchSettings {
                catch_panics: false,
            })
            .build()
            .unwrap();

        assert_eq!(manager.listener_count(), 2);
        assert_eq!(manager.interceptor_count(), 2);
        assert!(!manager.settings().catch_panics);
        assert!(manager.is_processable(&PING));
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let id = Id::literal("dup").unwrap();
        let result = ManagerConfiguration::new()
            .interceptors(InterceptorsGenerator::new().processing(
                id.clone(),
                0,
                processing_fn(|chain: &mut ProcessingChain<'_>| {
                    Box::pin(async move { chain.proceed().await })
                }),
            ))
            .add_listener(
                crate::builder::ListenerBuilder::new(&PING)
                    .id(id.clone())
                    .handle(|| async {})
                    .build()
                    .unwrap(),
            )
            .build();

        assert_eq!(result.err(), Some(RegistryError::DuplicateListenerId(id)));
    }
}
