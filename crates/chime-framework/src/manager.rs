//! Listener registry and event dispatch.
//!
//! [`ListenerManager`] is the central owner of all registered listeners and
//! interceptors. It:
//!
//! - Keeps listeners and interceptors in an immutable **snapshot**. Every
//!   mutation goes through one update path that builds a new snapshot and
//!   swaps it in; a dispatch clones the `Arc` of the current snapshot and
//!   never observes a half-applied change.
//! - Orders listeners by ascending [`Priority`], ties by registration order,
//!   and precomputes each listener's interceptor chain when the snapshot is
//!   built.
//! - Dispatches an event through the processing interceptors, then through
//!   every listener whose key is the event's key or one of its ancestors.
//! - Owns the global attribute scope and the pending continuous sessions
//!   shared by every dispatch.
//!
//! ```text
//! dispatch(event)
//!   └─ processing interceptors
//!        └─ for each matching listener
//!             └─ listener interceptors (BeforeMatch)
//!                  └─ filters
//!                       └─ listener interceptors (AfterMatch)
//!                            └─ handler
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = ListenerManager::new();
//! manager.register(listener(&PING, || async { "pong" }))?;
//! let result = manager.dispatch(BoxedEvent::new(Ping)).await?;
//! assert_eq!(result.contents(), vec![&json!("pong")]);
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chime_core::{BoxedEvent, EventKey, Id, Priority};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use crate::config::{DispatchSettings, ExceptionHandler};
use crate::context::{Attributes, EventContext, ListenerContext};
use crate::error::{DispatchError, RegistryError, RegistryResult};
use crate::interceptor::{
    Frame, InterceptPoint, Interceptor, InterceptorEntry, ListenerInterceptorEntry, Terminal,
    run_chain, run_chain_in,
};
use crate::listener::{InvokeMode, Listener};
use crate::result::{
    AsyncHandle, DispatchResult, EventResult, ListenerFailure, ListenerOutcome,
};
use crate::session::ContinuousSessions;

type ProcessingEntry = InterceptorEntry<EventContext, DispatchResult>;
type ListenerEntry = InterceptorEntry<ListenerContext, EventResult>;

/// What [`ListenerManager::unregister`] removed.
#[derive(Debug, Clone)]
pub enum Unregistered {
    /// A listener.
    Listener(Listener),
    /// A processing interceptor.
    ProcessingInterceptor(Id),
    /// A global listener interceptor.
    ListenerInterceptor(Id),
}

// =============================================================================
// Snapshot
// =============================================================================

/// A listener with its precomputed interceptor chain.
#[derive(Clone)]
struct ResolvedListener {
    listener: Listener,
    seq: u64,
    before: Arc<[ListenerEntry]>,
    after: Arc<[ListenerEntry]>,
}

impl ResolvedListener {
    /// Merges global and attached interceptors: ascending priority, global
    /// before attached on ties, then registration order.
    fn resolve(listener: Listener, seq: u64, globals: &[ListenerInterceptorEntry]) -> Self {
        let mut merged: Vec<((Priority, u8, u64), &ListenerInterceptorEntry)> = globals
            .iter()
            .map(|e| ((e.entry.priority, 0, e.entry.seq), e))
            .chain(
                listener
                    .interceptors()
                    .iter()
                    .map(|e| ((e.entry.priority, 1, e.entry.seq), e)),
            )
            .collect();
        merged.sort_by_key(|(key, _)| *key);

        let mut before = Vec::new();
        let mut after = Vec::new();
        for (_, e) in merged {
            match e.point {
                InterceptPoint::BeforeMatch => before.push(e.entry.clone()),
                InterceptPoint::AfterMatch => after.push(e.entry.clone()),
            }
        }

        Self {
            before: before.into(),
            after: after.into(),
            listener,
            seq,
        }
    }
}

/// An immutable view of the registry.
#[derive(Default)]
struct Snapshot {
    /// Sorted by (priority, seq).
    listeners: Vec<ResolvedListener>,
    /// Sorted by (priority, seq).
    processing: Vec<ProcessingEntry>,
    /// Sorted by (priority, seq).
    listener_interceptors: Vec<ListenerInterceptorEntry>,
    /// Listeners per dispatched event key, filled lazily.
    targets: RwLock<HashMap<EventKey, Arc<[ResolvedListener]>>>,
}

impl Snapshot {
    fn targets(&self, key: &'static EventKey) -> Arc<[ResolvedListener]> {
        if let Some(hit) = self.targets.read().get(key) {
            return Arc::clone(hit);
        }
        let resolved: Arc<[ResolvedListener]> = self
            .listeners
            .iter()
            .filter(|r| r.listener.is_target(key))
            .cloned()
            .collect();
        self.targets.write().insert(*key, Arc::clone(&resolved));
        resolved
    }

    fn draft(&self) -> Draft {
        Draft {
            listeners: self
                .listeners
                .iter()
                .map(|r| (r.listener.clone(), r.seq))
                .collect(),
            processing: self.processing.clone(),
            listener_interceptors: self.listener_interceptors.clone(),
        }
    }

    fn contains(&self, id: &Id) -> bool {
        self.listeners.iter().any(|r| owns_id(&r.listener, id))
            || self.processing.iter().any(|e| &e.id == id)
            || self.listener_interceptors.iter().any(|e| e.id() == id)
    }
}

/// Returns true if `id` is the listener's id or the id of one of its
/// attached interceptors.
fn owns_id(listener: &Listener, id: &Id) -> bool {
    listener.id() == id || listener.interceptors().iter().any(|e| e.id() == id)
}

/// A mutable copy of a snapshot, committed by [`Draft::into_snapshot`].
struct Draft {
    listeners: Vec<(Listener, u64)>,
    processing: Vec<ProcessingEntry>,
    listener_interceptors: Vec<ListenerInterceptorEntry>,
}

impl Draft {
    fn contains(&self, id: &Id) -> bool {
        self.listeners.iter().any(|(l, _)| owns_id(l, id))
            || self.processing.iter().any(|e| &e.id == id)
            || self.listener_interceptors.iter().any(|e| e.id() == id)
    }

    fn into_snapshot(mut self) -> Snapshot {
        self.listeners
            .sort_by_key(|(listener, seq)| (listener.priority(), *seq));
        self.processing.sort_by_key(|e| e.order_key());
        self.listener_interceptors
            .sort_by_key(|e| e.entry.order_key());

        let listeners = self
            .listeners
            .into_iter()
            .map(|(listener, seq)| {
                ResolvedListener::resolve(listener, seq, &self.listener_interceptors)
            })
            .collect();

        Snapshot {
            listeners,
            processing: self.processing,
            listener_interceptors: self.listener_interceptors,
            targets: RwLock::new(HashMap::new()),
        }
    }
}

// =============================================================================
// ListenerManager
// =============================================================================

/// Owns listeners and interceptors and dispatches events to them.
///
/// All methods take `&self`; share the manager with an `Arc`.
pub struct ListenerManager {
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serializes mutations.
    update: Mutex<()>,
    seq: AtomicU64,
    settings: DispatchSettings,
    exception_handler: Option<ExceptionHandler>,
    tracker: TaskTracker,
    runtime: Option<Handle>,
    global: Arc<Attributes>,
    sessions: Arc<ContinuousSessions>,
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerManager {
    /// Creates an empty manager with default settings.
    ///
    /// If called inside a tokio runtime, its handle is kept for
    /// [`dispatch_blocking`](Self::dispatch_blocking).
    pub fn new() -> Self {
        Self::with_parts(DispatchSettings::default(), None, Handle::try_current().ok())
    }

    pub(crate) fn with_parts(
        settings: DispatchSettings,
        exception_handler: Option<ExceptionHandler>,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            update: Mutex::new(()),
            seq: AtomicU64::new(0),
            settings,
            exception_handler,
            tracker: TaskTracker::new(),
            runtime,
            global: Arc::default(),
            sessions: Arc::default(),
        }
    }

    /// Returns the dispatch settings.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Attributes shared by every dispatch of this manager.
    pub fn global_scope(&self) -> &Arc<Attributes> {
        &self.global
    }

    /// Pending continuous sessions, resumed by later dispatches.
    pub fn sessions(&self) -> &Arc<ContinuousSessions> {
        &self.sessions
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Applies `f` to a draft of the current snapshot and commits it if `f`
    /// succeeds.
    fn mutate<T>(&self, f: impl FnOnce(&mut Draft) -> RegistryResult<T>) -> RegistryResult<T> {
        let _guard = self.update.lock();
        let mut draft = self.current().draft();
        let out = f(&mut draft)?;
        let next = Arc::new(draft.into_snapshot());
        *self.snapshot.write() = next;
        Ok(out)
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a listener.
    ///
    /// Listeners, interceptors and the interceptors attached to listeners
    /// share one id namespace. Fails with
    /// [`RegistryError::DuplicateListenerId`] if the listener's id is taken,
    /// and with [`RegistryError::DuplicateInterceptorId`] if one of its
    /// attached interceptors' ids is.
    pub fn register(&self, listener: Listener) -> RegistryResult<()> {
        self.register_all([listener])
    }

    /// Registers several listeners at once. Either all of them become visible
    /// to dispatches, or none does.
    pub fn register_all(&self, listeners: impl IntoIterator<Item = Listener>) -> RegistryResult<()> {
        let listeners: Vec<Listener> = listeners.into_iter().collect();
        self.mutate(|draft| {
            for listener in &listeners {
                if draft.contains(listener.id()) {
                    return Err(RegistryError::DuplicateListenerId(listener.id().clone()));
                }
                let attached = listener.interceptors();
                for (i, entry) in attached.iter().enumerate() {
                    let id = entry.id();
                    if id == listener.id()
                        || draft.contains(id)
                        || attached[..i].iter().any(|e| e.id() == id)
                    {
                        return Err(RegistryError::DuplicateInterceptorId(id.clone()));
                    }
                }
                draft.listeners.push((listener.clone(), self.next_seq()));
            }
            Ok(())
        })?;
        for listener in &listeners {
            info!(
                listener = %listener.id(),
                event_key = %listener.key(),
                priority = %listener.priority(),
                "Listener registered"
            );
        }
        Ok(())
    }

    /// Adds a processing interceptor, wrapping every dispatch.
    pub fn add_processing_interceptor<I>(
        &self,
        id: Id,
        priority: impl Into<Priority>,
        interceptor: I,
    ) -> RegistryResult<()>
    where
        I: Interceptor<EventContext, DispatchResult>,
    {
        self.add_processing_interceptor_arc(id, priority.into(), Arc::new(interceptor))
    }

    pub(crate) fn add_processing_interceptor_arc(
        &self,
        id: Id,
        priority: Priority,
        interceptor: Arc<dyn Interceptor<EventContext, DispatchResult>>,
    ) -> RegistryResult<()> {
        self.mutate(|draft| {
            if draft.contains(&id) {
                return Err(RegistryError::DuplicateInterceptorId(id.clone()));
            }
            draft.processing.push(InterceptorEntry::new(
                id.clone(),
                priority,
                self.next_seq(),
                interceptor,
            ));
            Ok(())
        })?;
        info!(interceptor = %id, priority = %priority, "Processing interceptor added");
        Ok(())
    }

    /// Adds a listener interceptor, wrapping every listener invocation.
    pub fn add_listener_interceptor<I>(
        &self,
        id: Id,
        priority: impl Into<Priority>,
        point: InterceptPoint,
        interceptor: I,
    ) -> RegistryResult<()>
    where
        I: Interceptor<ListenerContext, EventResult>,
    {
        self.add_listener_interceptor_arc(id, priority.into(), point, Arc::new(interceptor))
    }

    pub(crate) fn add_listener_interceptor_arc(
        &self,
        id: Id,
        priority: Priority,
        point: InterceptPoint,
        interceptor: Arc<dyn Interceptor<ListenerContext, EventResult>>,
    ) -> RegistryResult<()> {
        self.mutate(|draft| {
            if draft.contains(&id) {
                return Err(RegistryError::DuplicateInterceptorId(id.clone()));
            }
            draft.listener_interceptors.push(ListenerInterceptorEntry {
                entry: InterceptorEntry::new(id.clone(), priority, self.next_seq(), interceptor),
                point,
            });
            Ok(())
        })?;
        info!(interceptor = %id, priority = %priority, ?point, "Listener interceptor added");
        Ok(())
    }

    /// Removes the listener or interceptor registered under `id`.
    ///
    /// Interceptors attached to a listener leave with it and cannot be
    /// removed on their own; their ids yield [`RegistryError::NotFound`].
    pub fn unregister(&self, id: &Id) -> RegistryResult<Unregistered> {
        let removed = self.mutate(|draft| {
            if let Some(pos) = draft.listeners.iter().position(|(l, _)| l.id() == id) {
                let (listener, _) = draft.listeners.remove(pos);
                return Ok(Unregistered::Listener(listener));
            }
            if let Some(pos) = draft.processing.iter().position(|e| &e.id == id) {
                draft.processing.remove(pos);
                return Ok(Unregistered::ProcessingInterceptor(id.clone()));
            }
            if let Some(pos) = draft.listener_interceptors.iter().position(|e| e.id() == id) {
                draft.listener_interceptors.remove(pos);
                return Ok(Unregistered::ListenerInterceptor(id.clone()));
            }
            Err(RegistryError::NotFound(id.clone()))
        })?;
        info!(id = %id, "Unregistered");
        Ok(removed)
    }

    /// Removes every listener and interceptor.
    pub fn clear(&self) {
        let _guard = self.update.lock();
        *self.snapshot.write() = Arc::new(Snapshot::default());
        debug!("Listener registry cleared");
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// Returns the listener registered under `id`.
    pub fn get(&self, id: &Id) -> Option<Listener> {
        self.current()
            .listeners
            .iter()
            .find(|r| r.listener.id() == id)
            .map(|r| r.listener.clone())
    }

    /// Returns true if `id` names a registered listener or interceptor,
    /// attached interceptors included.
    pub fn contains(&self, id: &Id) -> bool {
        self.current().contains(id)
    }

    /// Returns all listeners in dispatch order.
    pub fn listeners(&self) -> Vec<Listener> {
        self.current()
            .listeners
            .iter()
            .map(|r| r.listener.clone())
            .collect()
    }

    /// Returns true if at least one listener would receive events with key `key`.
    pub fn is_processable(&self, key: &'static EventKey) -> bool {
        !self.current().targets(key).is_empty()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.current().listeners.len()
    }

    /// Number of registered processing and global listener interceptors.
    pub fn interceptor_count(&self) -> usize {
        let snapshot = self.current();
        snapshot.processing.len() + snapshot.listener_interceptors.len()
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    /// Dispatches `event` and returns the aggregated result.
    ///
    /// Pending continuous sessions whose matcher accepts the event are resumed
    /// first. Handler failures are recorded as failed outcomes. The returned
    /// error is reserved for chain misuse, such as an interceptor proceeding
    /// twice.
    pub async fn dispatch(&self, event: BoxedEvent) -> Result<DispatchResult, DispatchError> {
        let key = event.key();
        let span = debug_span!("dispatch", event_key = %key);

        async move {
            let snapshot = self.current();
            let targets = snapshot.targets(key);
            trace!(listeners = targets.len(), "Resolved listeners");

            let context = Arc::new(EventContext::scoped(
                event,
                Arc::clone(&self.global),
                Arc::clone(&self.sessions),
            ));
            let resumed = self.sessions.resume(&context);
            if resumed > 0 {
                debug!(sessions = resumed, "Continuous sessions resumed");
            }

            let terminal = ListenersTerminal {
                manager: self,
                context: Arc::clone(&context),
                targets,
            };
            let (mut result, short_circuited) =
                run_chain(&*context, &snapshot.processing, &terminal).await?;
            if short_circuited {
                debug!("Dispatch short-circuited by a processing interceptor");
                result.short_circuited = true;
            }
            debug!(outcomes = result.len(), "Dispatch finished");
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Dispatches `event` from synchronous code.
    ///
    /// Uses the runtime captured when the manager was created. Fails with
    /// [`DispatchError::NoRuntime`] if there is none, and with
    /// [`DispatchError::WithinRuntime`] on any thread that has entered a
    /// tokio runtime. That includes `spawn_blocking` threads, which should
    /// call `Handle::block_on` on [`dispatch`](Self::dispatch) instead.
    pub fn dispatch_blocking(&self, event: BoxedEvent) -> Result<DispatchResult, DispatchError> {
        if Handle::try_current().is_ok() {
            return Err(DispatchError::WithinRuntime);
        }
        let handle = self.runtime.as_ref().ok_or(DispatchError::NoRuntime)?;
        handle.block_on(self.dispatch(event))
    }

    /// Clears the registry, closes the pending continuous sessions and waits
    /// for every in-flight async listener.
    pub async fn shutdown(&self) {
        self.clear();
        self.sessions.clear();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Listener manager shut down");
    }

    fn guard(&self, fut: BoxFuture<'static, EventResult>) -> BoxFuture<'static, EventResult> {
        if !self.settings.catch_panics {
            return fut;
        }
        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => EventResult::Failed(ListenerFailure::from_panic(payload)),
            }
        })
    }
}

/// Logs a failed result and passes it through the exception handler.
fn handle_failure(
    handler: Option<&ExceptionHandler>,
    ctx: &ListenerContext,
    result: EventResult,
) -> EventResult {
    match result {
        EventResult::Failed(failure) => {
            warn!(listener = %ctx.listener_id(), error = %failure, "Listener failed");
            match handler {
                Some(handler) => handler(ctx, &failure),
                None => EventResult::Failed(failure),
            }
        }
        other => other,
    }
}

// =============================================================================
// Chain terminals
// =============================================================================

/// Innermost stage of the processing chain: runs the matching listeners.
struct ListenersTerminal<'a> {
    manager: &'a ListenerManager,
    context: Arc<EventContext>,
    targets: Arc<[ResolvedListener]>,
}

#[async_trait]
impl<'a> Terminal<EventContext, DispatchResult> for ListenersTerminal<'a> {
    async fn run(&self, _context: &EventContext) -> Result<DispatchResult, DispatchError> {
        for resolved in self.targets.iter() {
            let listener = &resolved.listener;
            let ctx = ListenerContext::new(
                Arc::clone(&self.context),
                listener.id().clone(),
                listener.key(),
                listener.priority(),
            );
            // Both interceptor segments of one listener share a frame, so a
            // short circuit after the match is visible before it.
            let frame = Frame::new();
            let matcher = MatchTerminal {
                manager: self.manager,
                resolved,
                frame: &frame,
            };

            let chain = run_chain_in(&ctx, &resolved.before, &matcher, &frame);
            let result = if self.manager.settings.catch_panics {
                match AssertUnwindSafe(chain).catch_unwind().await {
                    Ok(result) => result?,
                    Err(payload) => EventResult::Failed(ListenerFailure::from_panic(payload)),
                }
            } else {
                chain.await?
            };
            let result = handle_failure(self.manager.exception_handler.as_ref(), &ctx, result);
            if !result.is_valid() {
                continue;
            }

            let truncated = result.is_truncated();
            self.context.record(ListenerOutcome {
                listener: listener.id().clone(),
                result,
            });
            if truncated {
                debug!(listener = %listener.id(), "Dispatch truncated");
                self.context.mark_truncated();
                break;
            }
        }
        Ok(DispatchResult::from_outcomes(self.context.outcomes()))
    }
}

/// Evaluates the filters of one listener, then runs its after-match chain.
struct MatchTerminal<'a> {
    manager: &'a ListenerManager,
    resolved: &'a ResolvedListener,
    frame: &'a Frame<EventResult>,
}

#[async_trait]
impl<'a> Terminal<ListenerContext, EventResult> for MatchTerminal<'a> {
    async fn run(&self, ctx: &ListenerContext) -> Result<EventResult, DispatchError> {
        let listener = &self.resolved.listener;
        if !listener.matches(ctx) {
            trace!(listener = %listener.id(), "Filter rejected event, skipping");
            return Ok(EventResult::Invalid);
        }
        let handler = HandlerTerminal {
            manager: self.manager,
            listener,
        };
        run_chain_in(ctx, &self.resolved.after, &handler, self.frame).await
    }
}

/// Invokes the handler, inline or spawned depending on the invoke mode.
struct HandlerTerminal<'a> {
    manager: &'a ListenerManager,
    listener: &'a Listener,
}

#[async_trait]
impl<'a> Terminal<ListenerContext, EventResult> for HandlerTerminal<'a> {
    async fn run(&self, ctx: &ListenerContext) -> Result<EventResult, DispatchError> {
        let fut = self.manager.guard(self.listener.handler().invoke(ctx.clone()));
        match self.listener.mode() {
            InvokeMode::Blocking => Ok(fut.await),
            InvokeMode::Async => {
                let handler = self.manager.exception_handler.clone();
                let ctx = ctx.clone();
                let task = async move {
                    let result = fut.await;
                    handle_failure(handler.as_ref(), &ctx, result)
                };
                trace!(listener = %self.listener.id(), "Handler spawned");
                Ok(EventResult::Async(AsyncHandle::spawn(
                    &self.manager.tracker,
                    task,
                )))
            }
        }
    }
}
