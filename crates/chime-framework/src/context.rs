//! Dispatch contexts.
//!
//! Two context types model how one event flows through the listener manager:
//!
//! - [`EventContext`]: the **shared** context of one dispatch. Created fresh
//!   for every dispatched event and wrapped in an `Arc`. It holds the event,
//!   the outcomes recorded so far, the truncation flag and a typed state map
//!   that interceptors and handlers of the same dispatch can use to pass data
//!   along. It is dropped once the dispatch completes and never reused.
//!   Through it, handlers also reach the manager's global attributes and its
//!   continuous sessions.
//!
//! - [`ListenerContext`]: the context of **one listener invocation**. It
//!   shares the `EventContext` and adds read access to the listener being
//!   invoked. Handlers receive it by value, so it is cheap to clone.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chime_core::{BoxedEvent, EventKey, Id, Priority};
use parking_lot::Mutex;

use crate::result::ListenerOutcome;
use crate::session::ContinuousSessions;

// =============================================================================
// Attributes
// =============================================================================

/// A typed attribute map holding at most one value per type.
///
/// Used for the per-dispatch state of an [`EventContext`] and for the global
/// scope shared by every dispatch of a listener manager.
#[derive(Default)]
pub struct Attributes {
    values: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Attributes {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any value of the same type.
    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        self.values.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of the stored `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Returns a clone of the stored `T`, storing `init()` first if absent.
    pub fn get_or_insert_with<T, F>(&self, init: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut values = self.values.lock();
        if let Some(value) = values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
        {
            return value.clone();
        }
        let value = init();
        values.insert(TypeId::of::<T>(), Box::new(value.clone()));
        value
    }

    /// Returns true if a `T` is stored.
    pub fn contains<T: 'static>(&self) -> bool {
        self.values.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the stored `T`.
    pub fn take<T: 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every value.
    pub fn clear(&self) {
        self.values.lock().clear();
    }
}

impl Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attributes")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// EventContext
// =============================================================================

/// The shared context of a single dispatch.
pub struct EventContext {
    event: BoxedEvent,
    outcomes: Mutex<Vec<ListenerOutcome>>,
    truncated: AtomicBool,
    state: Attributes,
    global: Arc<Attributes>,
    sessions: Arc<ContinuousSessions>,
}

impl EventContext {
    /// Creates a standalone context for `event` with its own global scope and
    /// session list.
    pub fn new(event: BoxedEvent) -> Self {
        Self::scoped(event, Arc::default(), Arc::default())
    }

    /// Creates a context sharing the global scope and sessions of a manager.
    pub(crate) fn scoped(
        event: BoxedEvent,
        global: Arc<Attributes>,
        sessions: Arc<ContinuousSessions>,
    ) -> Self {
        Self {
            event,
            outcomes: Mutex::new(Vec::new()),
            truncated: AtomicBool::new(false),
            state: Attributes::new(),
            global,
            sessions,
        }
    }

    /// Returns the dispatched event.
    pub fn event(&self) -> &BoxedEvent {
        &self.event
    }

    /// Returns the key of the dispatched event.
    pub fn event_key(&self) -> &'static EventKey {
        self.event.key()
    }

    /// Returns a copy of the outcomes recorded so far.
    pub fn outcomes(&self) -> Vec<ListenerOutcome> {
        self.outcomes.lock().clone()
    }

    /// Number of outcomes recorded so far.
    pub fn outcome_count(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub(crate) fn record(&self, outcome: ListenerOutcome) {
        self.outcomes.lock().push(outcome);
    }

    /// Returns true once a listener truncated this dispatch.
    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_truncated(&self) {
        self.truncated.store(true, Ordering::SeqCst);
    }

    // ─── Typed state ─────────────────────────────────────────────────────────

    /// Stores a value in the dispatch state map.
    ///
    /// Only one value per type can be stored; subsequent calls overwrite.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.set(value);
    }

    /// Retrieves a cloned value from the dispatch state map.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state.get()
    }

    /// Returns `true` if a value of type `T` is stored.
    pub fn has_state<T: 'static>(&self) -> bool {
        self.state.contains::<T>()
    }

    /// Removes and returns a value from the dispatch state map.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state.take()
    }

    // ─── Manager scopes ──────────────────────────────────────────────────────

    /// The global scope, shared by every dispatch of the same manager.
    pub fn global(&self) -> &Arc<Attributes> {
        &self.global
    }

    /// The continuous sessions of the manager.
    pub fn sessions(&self) -> &Arc<ContinuousSessions> {
        &self.sessions
    }
}

impl Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("event", &self.event)
            .field("outcomes", &self.outcome_count())
            .field("truncated", &self.is_truncated())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ListenerContext
// =============================================================================

/// The context of one listener invocation.
#[derive(Clone)]
pub struct ListenerContext {
    event_context: Arc<EventContext>,
    listener_id: Id,
    listener_key: &'static EventKey,
    priority: Priority,
}

impl ListenerContext {
    /// Creates a listener context on top of a shared event context.
    pub fn new(
        event_context: Arc<EventContext>,
        listener_id: Id,
        listener_key: &'static EventKey,
        priority: Priority,
    ) -> Self {
        Self {
            event_context,
            listener_id,
            listener_key,
            priority,
        }
    }

    /// Returns the shared event context.
    pub fn event_context(&self) -> &Arc<EventContext> {
        &self.event_context
    }

    /// Returns the dispatched event.
    pub fn event(&self) -> &BoxedEvent {
        self.event_context.event()
    }

    /// Id of the listener being invoked.
    pub fn listener_id(&self) -> &Id {
        &self.listener_id
    }

    /// Key the listener being invoked was registered for.
    ///
    /// This may be an ancestor of the dispatched event's key.
    pub fn listener_key(&self) -> &'static EventKey {
        self.listener_key
    }

    /// Priority of the listener being invoked.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Shorthand for [`EventContext::set_state`].
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.event_context.set_state(value);
    }

    /// Shorthand for [`EventContext::get_state`].
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.event_context.get_state()
    }

    /// Shorthand for [`EventContext::global`].
    pub fn global(&self) -> &Arc<Attributes> {
        self.event_context.global()
    }

    /// Shorthand for [`EventContext::sessions`].
    pub fn sessions(&self) -> &Arc<ContinuousSessions> {
        self.event_context.sessions()
    }
}

impl Debug for ListenerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerContext")
            .field("listener_id", &self.listener_id)
            .field("listener_key", &self.listener_key)
            .field("event", self.event_context.event())
            .finish()
    }
}
