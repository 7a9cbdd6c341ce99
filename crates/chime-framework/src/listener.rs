//! Listeners.
//!
//! A [`Listener`] binds one handler to an [`EventKey`], guarded by an ordered
//! list of filters and wrapped by its own interceptors. Listeners are built
//! with [`ListenerBuilder`](crate::builder::ListenerBuilder) and immutable
//! afterwards; cloning is cheap.

use std::fmt::{self, Debug};
use std::sync::Arc;

use chime_core::{EventKey, Id, Priority};
use serde::{Deserialize, Serialize};

use crate::context::ListenerContext;
use crate::handler::BoxedHandler;
use crate::interceptor::ListenerInterceptorEntry;

/// A filter predicate. A listener runs only if every filter returns true.
pub type Filter = Arc<dyn Fn(&ListenerContext) -> bool + Send + Sync>;

/// How the handler of a listener is invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeMode {
    /// The handler is awaited on the dispatching task.
    #[default]
    Blocking,
    /// The handler is spawned; the dispatch records an async handle.
    Async,
}

/// A registered (or registrable) event listener.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    id: Id,
    key: &'static EventKey,
    priority: Priority,
    mode: InvokeMode,
    filters: Vec<Filter>,
    interceptors: Vec<ListenerInterceptorEntry>,
    handler: BoxedHandler,
}

impl Listener {
    pub(crate) fn new(
        id: Id,
        key: &'static EventKey,
        priority: Priority,
        mode: InvokeMode,
        filters: Vec<Filter>,
        interceptors: Vec<ListenerInterceptorEntry>,
        handler: BoxedHandler,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                id,
                key,
                priority,
                mode,
                filters,
                interceptors,
                handler,
            }),
        }
    }

    /// Id of the listener.
    pub fn id(&self) -> &Id {
        &self.inner.id
    }

    /// Key the listener is registered for.
    pub fn key(&self) -> &'static EventKey {
        self.inner.key
    }

    /// Priority among listeners of the same dispatch.
    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    /// Invocation mode of the handler.
    pub fn mode(&self) -> InvokeMode {
        self.inner.mode
    }

    /// Returns true if this listener handles events with key `key`.
    pub fn is_target(&self, key: &EventKey) -> bool {
        key.is_sub_of(self.inner.key)
    }

    /// Evaluates the filters in order; stops at the first rejection.
    pub fn matches(&self, ctx: &ListenerContext) -> bool {
        self.inner.filters.iter().all(|filter| filter(ctx))
    }

    /// Number of filters.
    pub fn filter_count(&self) -> usize {
        self.inner.filters.len()
    }

    /// Interceptors attached to this listener.
    pub fn interceptors(&self) -> &[ListenerInterceptorEntry] {
        &self.inner.interceptors
    }

    pub(crate) fn handler(&self) -> &BoxedHandler {
        &self.inner.handler
    }

    /// Returns true if both values refer to the same built listener.
    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("priority", &self.inner.priority)
            .field("mode", &self.inner.mode)
            .field("filters", &self.inner.filters.len())
            .field("interceptors", &self.inner.interceptors)
            .finish_non_exhaustive()
    }
}
