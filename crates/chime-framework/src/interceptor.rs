//! Interceptor chains.
//!
//! An interceptor wraps the rest of a chain. It receives a [`Chain`] and
//! decides whether to continue it with [`Chain::proceed`], to substitute a
//! result with [`Chain::short_circuit`], or to simply return its own result
//! without proceeding.
//!
//! ```text
//!   interceptor(prio 1) ─┐
//!     interceptor(prio 2) ─┐
//!       interceptor(prio 3) ─┐
//!                            └──▶ terminal (listeners / filters / handler)
//! ```
//!
//! Two chains exist:
//!
//! - the **processing** chain ([`ProcessingChain`]) wraps a whole dispatch and
//!   produces a [`DispatchResult`];
//! - the **listener** chain ([`ListenerChain`]) wraps one listener invocation
//!   and produces an [`EventResult`]. Listener interceptors run either around
//!   filter matching ([`InterceptPoint::BeforeMatch`]) or only once the filters
//!   matched ([`InterceptPoint::AfterMatch`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use chime_framework::{DispatchError, EventResult, Interceptor, ListenerChain};
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Interceptor<ListenerContext, EventResult> for Audit {
//!     async fn intercept(&self, chain: &mut ListenerChain<'_>) -> Result<EventResult, DispatchError> {
//!         tracing::info!(listener = %chain.context().listener_id(), "before");
//!         let result = chain.proceed().await?;
//!         tracing::info!(valid = result.is_valid(), "after");
//!         Ok(result)
//!     }
//! }
//! ```

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chime_core::{Id, Priority};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::{EventContext, ListenerContext};
use crate::error::DispatchError;
use crate::result::{DispatchResult, EventResult};

// =============================================================================
// Interceptor trait
// =============================================================================

/// A stage of an interceptor chain.
///
/// Implementations must call [`Chain::proceed`] at most once. Not calling it
/// short-circuits the chain with the returned value.
#[async_trait]
pub trait Interceptor<C, R>: Send + Sync + 'static {
    /// Runs this stage.
    async fn intercept(&self, chain: &mut Chain<'_, C, R>) -> Result<R, DispatchError>;
}

/// An interceptor of the processing chain.
pub type ProcessingInterceptor = dyn Interceptor<EventContext, DispatchResult>;

/// An interceptor of a listener chain.
pub type ListenerInterceptor = dyn Interceptor<ListenerContext, EventResult>;

/// The processing chain, as seen by a processing interceptor.
pub type ProcessingChain<'a> = Chain<'a, EventContext, DispatchResult>;

/// A listener chain, as seen by a listener interceptor.
pub type ListenerChain<'a> = Chain<'a, ListenerContext, EventResult>;

/// Where a listener interceptor runs relative to filter matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptPoint {
    /// Wraps filter matching and the handler.
    #[default]
    BeforeMatch,
    /// Runs only once every filter matched; wraps the handler alone.
    AfterMatch,
}

// =============================================================================
// Entries
// =============================================================================

/// A registered interceptor with its ordering metadata.
pub struct InterceptorEntry<C, R> {
    pub(crate) id: Id,
    pub(crate) priority: Priority,
    pub(crate) seq: u64,
    pub(crate) interceptor: Arc<dyn Interceptor<C, R>>,
}

impl<C, R> InterceptorEntry<C, R> {
    pub(crate) fn new(
        id: Id,
        priority: Priority,
        seq: u64,
        interceptor: Arc<dyn Interceptor<C, R>>,
    ) -> Self {
        Self {
            id,
            priority,
            seq,
            interceptor,
        }
    }

    /// Id of the interceptor.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Priority of the interceptor.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn order_key(&self) -> (Priority, u64) {
        (self.priority, self.seq)
    }
}

impl<C, R> Clone for InterceptorEntry<C, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            priority: self.priority,
            seq: self.seq,
            interceptor: Arc::clone(&self.interceptor),
        }
    }
}

impl<C, R> Debug for InterceptorEntry<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// A listener interceptor with the point it runs at.
#[derive(Clone, Debug)]
pub struct ListenerInterceptorEntry {
    pub(crate) entry: InterceptorEntry<ListenerContext, EventResult>,
    pub(crate) point: InterceptPoint,
}

impl ListenerInterceptorEntry {
    /// Id of the interceptor.
    pub fn id(&self) -> &Id {
        &self.entry.id
    }

    /// Priority of the interceptor.
    pub fn priority(&self) -> Priority {
        self.entry.priority
    }

    /// Where the interceptor runs.
    pub fn point(&self) -> InterceptPoint {
        self.point
    }
}

// =============================================================================
// Chain
// =============================================================================

/// The innermost stage of a chain.
#[async_trait]
pub(crate) trait Terminal<C, R>: Send + Sync {
    async fn run(&self, context: &C) -> Result<R, DispatchError>;
}

/// State shared by every stage of one chain run.
///
/// A listener chain is split around filter matching; both segments run in
/// the same frame.
pub(crate) struct Frame<R> {
    substitute: Mutex<Option<R>>,
    stopped: AtomicBool,
}

impl<R: Clone> Frame<R> {
    pub(crate) fn new() -> Self {
        Self {
            substitute: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn substitute(&self) -> Option<R> {
        self.substitute.lock().clone()
    }
}

/// The remainder of an interceptor chain, handed to one interceptor.
pub struct Chain<'a, C, R> {
    context: &'a C,
    owner: &'a Id,
    rest: &'a [InterceptorEntry<C, R>],
    terminal: &'a dyn Terminal<C, R>,
    frame: &'a Frame<R>,
    proceeded: bool,
}

impl<'a, C, R> Chain<'a, C, R>
where
    C: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Returns the context this chain runs for.
    pub fn context(&self) -> &'a C {
        self.context
    }

    /// Id of the interceptor this chain was handed to.
    pub fn interceptor_id(&self) -> &Id {
        self.owner
    }

    /// Continues the chain and returns the result of the remaining stages.
    ///
    /// If an earlier stage already short-circuited, the substituted result is
    /// returned and nothing else runs. Calling this twice fails with
    /// [`DispatchError::DoubleProceed`].
    pub async fn proceed(&mut self) -> Result<R, DispatchError> {
        if self.proceeded {
            return Err(DispatchError::DoubleProceed {
                interceptor: self.owner.clone(),
            });
        }
        self.proceeded = true;

        if let Some(substitute) = self.frame.substitute() {
            return Ok(substitute);
        }
        run_stage(self.context, self.rest, self.terminal, self.frame).await
    }

    /// Stops the chain and records `result` as its substitute.
    ///
    /// Inner stages no longer run; enclosing interceptors observe
    /// [`is_short_circuited`](Self::is_short_circuited) once control returns
    /// to them.
    pub fn short_circuit(&self, result: R) {
        *self.frame.substitute.lock() = Some(result);
        self.frame.stop();
    }

    /// Returns true if some stage of this chain short-circuited.
    pub fn is_short_circuited(&self) -> bool {
        self.frame.is_stopped()
    }

    /// Returns true if this interceptor already proceeded.
    pub fn has_proceeded(&self) -> bool {
        self.proceeded
    }
}

fn run_stage<'a, C, R>(
    context: &'a C,
    stages: &'a [InterceptorEntry<C, R>],
    terminal: &'a dyn Terminal<C, R>,
    frame: &'a Frame<R>,
) -> BoxFuture<'a, Result<R, DispatchError>>
where
    C: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    Box::pin(async move {
        let Some((head, rest)) = stages.split_first() else {
            return terminal.run(context).await;
        };

        let mut chain = Chain {
            context,
            owner: &head.id,
            rest,
            terminal,
            frame,
            proceeded: false,
        };
        let result = head.interceptor.intercept(&mut chain).await;
        if !chain.proceeded {
            frame.stop();
        }
        result
    })
}

/// Runs `stages` around `terminal`.
///
/// Returns the chain result and whether any stage short-circuited.
pub(crate) async fn run_chain<C, R>(
    context: &C,
    stages: &[InterceptorEntry<C, R>],
    terminal: &dyn Terminal<C, R>,
) -> Result<(R, bool), DispatchError>
where
    C: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    let frame = Frame::new();
    let result = run_chain_in(context, stages, terminal, &frame).await?;
    Ok((result, frame.is_stopped()))
}

/// Runs `stages` around `terminal` as part of the chain owning `frame`.
pub(crate) async fn run_chain_in<C, R>(
    context: &C,
    stages: &[InterceptorEntry<C, R>],
    terminal: &dyn Terminal<C, R>,
    frame: &Frame<R>,
) -> Result<R, DispatchError>
where
    C: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    run_stage(context, stages, terminal, frame).await
}

// =============================================================================
// Closure interceptors
// =============================================================================

/// An interceptor backed by a closure. See [`interceptor_fn`].
pub struct InterceptorFn<F, C, R> {
    f: F,
    _marker: PhantomData<fn() -> (C, R)>,
}

/// Creates an interceptor from a closure.
///
/// ```rust,ignore
/// let logging = interceptor_fn(|chain: &mut ListenerChain<'_>| {
///     Box::pin(async move {
///         let result = chain.proceed().await?;
///         Ok(result)
///     })
/// });
/// ```
pub fn interceptor_fn<C, R, F>(f: F) -> InterceptorFn<F, C, R>
where
    F: for<'a, 'b> Fn(&'a mut Chain<'b, C, R>) -> BoxFuture<'a, Result<R, DispatchError>>
        + Send
        + Sync
        + 'static,
{
    InterceptorFn {
        f,
        _marker: PhantomData,
    }
}

/// Creates a processing interceptor from a closure.
pub fn processing_fn<F>(f: F) -> InterceptorFn<F, EventContext, DispatchResult>
where
    F: for<'a, 'b> Fn(
            &'a mut ProcessingChain<'b>,
        ) -> BoxFuture<'a, Result<DispatchResult, DispatchError>>
        + Send
        + Sync
        + 'static,
{
    interceptor_fn(f)
}

/// Creates a listener interceptor from a closure.
pub fn listener_fn<F>(f: F) -> InterceptorFn<F, ListenerContext, EventResult>
where
    F: for<'a, 'b> Fn(&'a mut ListenerChain<'b>) -> BoxFuture<'a, Result<EventResult, DispatchError>>
        + Send
        + Sync
        + 'static,
{
    interceptor_fn(f)
}

#[async_trait]
impl<F, C, R> Interceptor<C, R> for InterceptorFn<F, C, R>
where
    F: for<'a, 'b> Fn(&'a mut Chain<'b, C, R>) -> BoxFuture<'a, Result<R, DispatchError>>
        + Send
        + Sync
        + 'static,
    C: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    async fn intercept(&self, chain: &mut Chain<'_, C, R>) -> Result<R, DispatchError> {
        (self.f)(chain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        log: Log,
    }

    #[async_trait]
    impl Interceptor<(), u32> for Recording {
        async fn intercept(&self, chain: &mut Chain<'_, (), u32>) -> Result<u32, DispatchError> {
            self.log.lock().push(format!("{}:before", self.name));
            let result = chain.proceed().await?;
            self.log
                .lock()
                .push(format!("{}:after:{}:{}", self.name, result, chain.is_short_circuited()));
            Ok(result)
        }
    }

    struct Substitute(u32);

    #[async_trait]
    impl Interceptor<(), u32> for Substitute {
        async fn intercept(&self, _chain: &mut Chain<'_, (), u32>) -> Result<u32, DispatchError> {
            Ok(self.0)
        }
    }

    struct ProceedTwice;

    #[async_trait]
    impl Interceptor<(), u32> for ProceedTwice {
        async fn intercept(&self, chain: &mut Chain<'_, (), u32>) -> Result<u32, DispatchError> {
            chain.proceed().await?;
            chain.proceed().await
        }
    }

    struct Counting(Log);

    #[async_trait]
    impl Terminal<(), u32> for Counting {
        async fn run(&self, _context: &()) -> Result<u32, DispatchError> {
            self.0.lock().push("terminal".to_string());
            Ok(100)
        }
    }

    fn entry(
        name: &'static str,
        priority: i32,
        seq: u64,
        interceptor: Arc<dyn Interceptor<(), u32>>,
    ) -> InterceptorEntry<(), u32> {
        InterceptorEntry::new(
            Id::literal(name).unwrap(),
            Priority(priority),
            seq,
            interceptor,
        )
    }

    fn recording(name: &'static str, priority: i32, seq: u64, log: &Log) -> InterceptorEntry<(), u32> {
        entry(
            name,
            priority,
            seq,
            Arc::new(Recording {
                name,
                log: log.clone(),
            }),
        )
    }

    #[tokio::test]
    async fn test_stages_nest_in_order() {
        let log: Log = Arc::default();
        let stages = vec![recording("a", 1, 0, &log), recording("b", 2, 1, &log)];
        let terminal = Counting(log.clone());

        let (result, stopped) = run_chain(&(), &stages, &terminal).await.unwrap();
        assert_eq!(result, 100);
        assert!(!stopped);
        assert_eq!(
            *log.lock(),
            vec![
                "a:before",
                "b:before",
                "terminal",
                "b:after:100:false",
                "a:after:100:false"
            ]
        );
    }

    #[tokio::test]
    async fn test_not_proceeding_short_circuits() {
        let log: Log = Arc::default();
        let stages = vec![
            recording("outer", 1, 0, &log),
            entry("sub", 2, 1, Arc::new(Substitute(7))),
            recording("inner", 3, 2, &log),
        ];
        let terminal = Counting(log.clone());

        let (result, stopped) = run_chain(&(), &stages, &terminal).await.unwrap();
        assert_eq!(result, 7);
        assert!(stopped);
        assert_eq!(*log.lock(), vec!["outer:before", "outer:after:7:true"]);
    }

    #[tokio::test]
    async fn test_explicit_short_circuit_is_returned_by_proceed() {
        let log: Log = Arc::default();
        let stages = vec![
            entry(
                "sc",
                1,
                0,
                Arc::new(interceptor_fn(|chain: &mut Chain<'_, (), u32>| {
                    Box::pin(async move {
                        chain.short_circuit(5);
                        chain.proceed().await
                    })
                })),
            ),
            recording("inner", 2, 1, &log),
        ];
        let terminal = Counting(log.clone());

        let (result, stopped) = run_chain(&(), &stages, &terminal).await.unwrap();
        assert_eq!(result, 5);
        assert!(stopped);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_double_proceed_is_reported() {
        let log: Log = Arc::default();
        let stages = vec![entry("twice", 1, 0, Arc::new(ProceedTwice))];
        let terminal = Counting(log.clone());

        let err = run_chain(&(), &stages, &terminal).await.unwrap_err();
        match err {
            DispatchError::DoubleProceed { interceptor } => {
                assert_eq!(interceptor, Id::literal("twice").unwrap());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_runs_terminal() {
        let log: Log = Arc::default();
        let terminal = Counting(log.clone());
        let (result, stopped) = run_chain(&(), &[], &terminal).await.unwrap();
        assert_eq!(result, 100);
        assert!(!stopped);
    }
}
