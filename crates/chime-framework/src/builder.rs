//! Listener builder DSL.
//!
//! Builders are plain values: every call consumes the builder and returns it,
//! so a listener is described by a single expression.
//!
//! ```rust,ignore
//! let l = ListenerBuilder::new(&PING)
//!     .id(Id::literal("ping")?)
//!     .priority(Priority::HIGH)
//!     .filter(|ctx| ctx.event().bot_id().is_some())
//!     .handle(|| async { "pong" })
//!     .build()?;
//!
//! let listeners = ListenersGenerator::new()
//!     .listen(&PING, |b| b.handle(|| async { "pong" }))?
//!     .listen(&MESSAGE, |b| b.asynchronous().handle(on_message))?;
//! ```

use std::sync::Arc;

use chime_core::{EventKey, Id, Priority};

use crate::context::ListenerContext;
use crate::error::BuildError;
use crate::handler::{BoxedHandler, Handler, blocking_handler, into_handler};
use crate::interceptor::{InterceptPoint, Interceptor, InterceptorEntry, ListenerInterceptorEntry};
use crate::listener::{Filter, InvokeMode, Listener};
use crate::result::{EventResult, IntoEventResult};

/// Builds a [`Listener`].
pub struct ListenerBuilder {
    key: &'static EventKey,
    id: Option<Id>,
    priority: Priority,
    mode: InvokeMode,
    filters: Vec<Filter>,
    interceptors: Vec<ListenerInterceptorEntry>,
    handler: Option<BoxedHandler>,
}

impl ListenerBuilder {
    /// Starts a listener for events with key `key` (or any descendant key).
    pub fn new(key: &'static EventKey) -> Self {
        Self {
            key,
            id: None,
            priority: Priority::NORMAL,
            mode: InvokeMode::Blocking,
            filters: Vec::new(),
            interceptors: Vec::new(),
            handler: None,
        }
    }

    /// Sets the listener id. A random id is used otherwise.
    pub fn id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the listener priority.
    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Appends a filter. Filters run in the order they were added.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ListenerContext) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Attaches an interceptor that wraps filter matching and the handler.
    pub fn intercept<I>(self, priority: impl Into<Priority>, interceptor: I) -> Self
    where
        I: Interceptor<ListenerContext, EventResult>,
    {
        self.intercept_at(
            Id::random(),
            priority,
            InterceptPoint::BeforeMatch,
            interceptor,
        )
    }

    /// Attaches an interceptor with an explicit id and intercept point.
    pub fn intercept_at<I>(
        mut self,
        id: Id,
        priority: impl Into<Priority>,
        point: InterceptPoint,
        interceptor: I,
    ) -> Self
    where
        I: Interceptor<ListenerContext, EventResult>,
    {
        let seq = self.interceptors.len() as u64;
        self.interceptors.push(ListenerInterceptorEntry {
            entry: InterceptorEntry::new(id, priority.into(), seq, Arc::new(interceptor)),
            point,
        });
        self
    }

    /// Sets the invocation mode.
    pub fn mode(mut self, mode: InvokeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `.mode(InvokeMode::Async)`.
    pub fn asynchronous(self) -> Self {
        self.mode(InvokeMode::Async)
    }

    /// Sets the handler.
    pub fn handle<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.handler = Some(into_handler(handler));
        self
    }

    /// Sets a synchronous handler over the listener context.
    pub fn handle_blocking<F, Out>(mut self, handler: F) -> Self
    where
        F: Fn(ListenerContext) -> Out + Send + Sync + 'static,
        Out: IntoEventResult + 'static,
    {
        self.handler = Some(blocking_handler(handler));
        self
    }

    /// Finishes the listener.
    ///
    /// Fails with [`BuildError::IncompleteListener`] if no handler was set.
    pub fn build(self) -> Result<Listener, BuildError> {
        let id = self.id.unwrap_or_else(Id::random);
        let Some(handler) = self.handler else {
            return Err(BuildError::IncompleteListener {
                id,
                key: self.key.name(),
            });
        };
        Ok(Listener::new(
            id,
            self.key,
            self.priority,
            self.mode,
            self.filters,
            self.interceptors,
            handler,
        ))
    }
}

/// Builds a listener on `key` with a random id and no filters.
pub fn listener<H, T>(key: &'static EventKey, handler: H) -> Listener
where
    H: Handler<T>,
    T: 'static,
{
    Listener::new(
        Id::random(),
        key,
        Priority::NORMAL,
        InvokeMode::Blocking,
        Vec::new(),
        Vec::new(),
        into_handler(handler),
    )
}

// =============================================================================
// ListenersGenerator
// =============================================================================

/// Collects several listeners, typically for a
/// [`ManagerConfiguration`](crate::config::ManagerConfiguration).
#[derive(Default)]
pub struct ListenersGenerator {
    listeners: Vec<Listener>,
}

impl ListenersGenerator {
    /// Creates an empty generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Describes one listener on `key` through `configure`.
    pub fn listen<F>(mut self, key: &'static EventKey, configure: F) -> Result<Self, BuildError>
    where
        F: FnOnce(ListenerBuilder) -> ListenerBuilder,
    {
        let listener = configure(ListenerBuilder::new(key)).build()?;
        self.listeners.push(listener);
        Ok(self)
    }

    /// Adds an already built listener.
    pub fn add(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Number of collected listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if no listener was collected.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the collected listeners in declaration order.
    pub fn into_listeners(self) -> Vec<Listener> {
        self.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::interceptor::{ListenerChain, listener_fn};

    static PING: EventKey = EventKey::root("ping");

    #[test]
    fn test_build_requires_handler() {
        let err = ListenerBuilder::new(&PING)
            .id(Id::literal("no-handler").unwrap())
            .filter(|_| true)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::IncompleteListener {
                id: Id::literal("no-handler").unwrap(),
                key: "ping",
            }
        );
    }

    #[test]
    fn test_builder_sets_metadata() {
        let passthrough = listener_fn(|chain: &mut ListenerChain<'_>| {
            Box::pin(async move { chain.proceed().await })
        });

        let l = ListenerBuilder::new(&PING)
            .id(Id::literal("ping").unwrap())
            .priority(Priority::HIGH)
            .filter(|_| true)
            .filter(|ctx| ctx.listener_key() == &PING)
            .intercept(5, passthrough)
            .asynchronous()
            .handle(|| async { "pong" })
            .build()
            .unwrap();

        assert_eq!(l.id(), &Id::literal("ping").unwrap());
        assert_eq!(l.key(), &PING);
        assert_eq!(l.priority(), Priority::HIGH);
        assert_eq!(l.mode(), InvokeMode::Async);
        assert_eq!(l.filter_count(), 2);
        assert_eq!(l.interceptors().len(), 1);
        assert_eq!(l.interceptors()[0].priority(), Priority(5));
        assert_eq!(l.interceptors()[0].point(), InterceptPoint::BeforeMatch);
    }

    #[test]
    fn test_shorthand_matches_builder_shape() {
        let a = listener(&PING, || async {});
        assert_eq!(a.priority(), Priority::NORMAL);
        assert_eq!(a.mode(), InvokeMode::Blocking);
        assert_eq!(a.filter_count(), 0);

        let b = listener(&PING, || async {});
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_generator_collects_in_order() -> Result<(), BuildError> {
        let generator = ListenersGenerator::new()
            .listen(&PING, |b| b.id(Id::from(1_i64)).handle(|| async {}))?
            .listen(&PING, |b| {
                b.id(Id::from(2_i64))
                    .handle_blocking(|_ctx: ListenerContext| Ok::<_, DispatchError>(()))
            })?
            .add(listener(&PING, || async {}));

        let ids: Vec<Id> = generator
            .into_listeners()
            .iter()
            .map(|l| l.id().clone())
            .collect();
        assert_eq!(&ids[..2], &[Id::from(1_i64), Id::from(2_i64)]);
        assert_eq!(ids.len(), 3);

        let incomplete = ListenersGenerator::new().listen(&PING, |b| b);
        assert!(incomplete.is_err());
        Ok(())
    }
}
