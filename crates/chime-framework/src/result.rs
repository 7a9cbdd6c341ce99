//! Listener and dispatch results.
//!
//! Every listener invocation produces an [`EventResult`]. The manager collects
//! the recorded ones, in invocation order, into a [`DispatchResult`]:
//!
//! - [`EventResult::Invalid`] is never recorded (skipped listener).
//! - A truncated [`EventResult::Value`] from a blocking listener stops the
//!   remaining listeners of the dispatch.
//! - [`EventResult::Async`] carries the eventual result of a listener that was
//!   spawned instead of awaited.
//! - [`EventResult::Failed`] records a handler error or panic.

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::future::Future;

use chime_core::Id;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio_util::task::TaskTracker;

use crate::error::BoxError;

// =============================================================================
// Listener failure
// =============================================================================

/// Describes why a handler did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    message: String,
    panicked: bool,
}

impl ListenerFailure {
    /// A failure caused by an error returned from the handler.
    pub fn from_error(err: &(dyn std::error::Error + Send + Sync + 'static)) -> Self {
        Self {
            message: err.to_string(),
            panicked: false,
        }
    }

    /// A failure caused by a panic inside the handler.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self {
            message,
            panicked: true,
        }
    }

    /// Failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the handler panicked.
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

impl Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "handler panicked: {}", self.message)
        } else {
            write!(f, "handler failed: {}", self.message)
        }
    }
}

impl From<BoxError> for ListenerFailure {
    fn from(err: BoxError) -> Self {
        Self::from_error(err.as_ref())
    }
}

// =============================================================================
// Async handle
// =============================================================================

/// The eventual result of a listener invoked asynchronously.
///
/// Cheap to clone; every clone observes the same result.
#[derive(Clone)]
pub struct AsyncHandle {
    inner: Shared<BoxFuture<'static, EventResult>>,
}

impl AsyncHandle {
    /// Spawns `fut` on the current runtime, tracked by `tracker`.
    pub(crate) fn spawn<F>(tracker: &TaskTracker, fut: F) -> Self
    where
        F: Future<Output = EventResult> + Send + 'static,
    {
        let task = tracker.spawn(fut);
        let inner = async move {
            match task.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    EventResult::Failed(ListenerFailure::from_panic(err.into_panic()))
                }
                Err(err) => EventResult::Failed(ListenerFailure {
                    message: err.to_string(),
                    panicked: false,
                }),
            }
        };
        Self {
            inner: inner.boxed().shared(),
        }
    }

    /// Creates a handle that is already complete.
    pub fn ready(result: EventResult) -> Self {
        Self {
            inner: futures::future::ready(result).boxed().shared(),
        }
    }

    /// Waits for the listener to finish.
    pub async fn wait(&self) -> EventResult {
        self.inner.clone().await
    }

    /// Returns the result if the listener already finished.
    pub fn peek(&self) -> Option<&EventResult> {
        self.inner.peek()
    }
}

impl Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("completed", &self.peek().is_some())
            .finish()
    }
}

// =============================================================================
// Event result
// =============================================================================

/// The result of one listener invocation.
#[derive(Debug, Clone)]
pub enum EventResult {
    /// The listener did not handle the event. Never recorded.
    Invalid,
    /// The listener ran.
    Value {
        /// Optional content produced by the handler.
        content: Option<Value>,
        /// Stops the remaining listeners of this dispatch.
        truncated: bool,
    },
    /// The listener was spawned; the handle resolves to its real result.
    Async(AsyncHandle),
    /// The handler returned an error or panicked.
    Failed(ListenerFailure),
}

impl EventResult {
    /// A handled result without content.
    pub const fn empty() -> Self {
        Self::Value {
            content: None,
            truncated: false,
        }
    }

    /// A handled result without content that stops the remaining listeners.
    pub const fn truncate() -> Self {
        Self::Value {
            content: None,
            truncated: true,
        }
    }

    /// A handled result carrying `content`.
    pub fn of(content: impl Into<Value>) -> Self {
        Self::Value {
            content: Some(content.into()),
            truncated: false,
        }
    }

    /// Marks a value result as truncating. Other variants are returned unchanged.
    pub fn truncated(self) -> Self {
        match self {
            Self::Value { content, .. } => Self::Value {
                content,
                truncated: true,
            },
            other => other,
        }
    }

    /// Returns false for [`EventResult::Invalid`].
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Returns true if this result stops the remaining listeners.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Value { truncated: true, .. })
    }

    /// Returns true for a failed result.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the content of a value result.
    pub fn content(&self) -> Option<&Value> {
        match self {
            Self::Value { content, .. } => content.as_ref(),
            _ => None,
        }
    }

    /// Returns the failure of a failed result.
    pub fn failure(&self) -> Option<&ListenerFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Resolves an async result to the listener's real result.
    pub async fn settle(self) -> Self {
        match self {
            Self::Async(handle) => handle.wait().await,
            other => other,
        }
    }
}

impl Default for EventResult {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// IntoEventResult
// =============================================================================

/// Conversion of handler return values into an [`EventResult`].
pub trait IntoEventResult {
    /// Performs the conversion.
    fn into_event_result(self) -> EventResult;
}

impl IntoEventResult for EventResult {
    fn into_event_result(self) -> EventResult {
        self
    }
}

impl IntoEventResult for () {
    fn into_event_result(self) -> EventResult {
        EventResult::empty()
    }
}

impl IntoEventResult for &'static str {
    fn into_event_result(self) -> EventResult {
        EventResult::of(self)
    }
}

impl IntoEventResult for String {
    fn into_event_result(self) -> EventResult {
        EventResult::of(self)
    }
}

impl IntoEventResult for Value {
    fn into_event_result(self) -> EventResult {
        EventResult::of(self)
    }
}

impl IntoEventResult for bool {
    fn into_event_result(self) -> EventResult {
        EventResult::of(self)
    }
}

impl<T: IntoEventResult> IntoEventResult for Option<T> {
    fn into_event_result(self) -> EventResult {
        match self {
            Some(v) => v.into_event_result(),
            None => EventResult::Invalid,
        }
    }
}

impl<T, E> IntoEventResult for Result<T, E>
where
    T: IntoEventResult,
    E: Into<BoxError>,
{
    fn into_event_result(self) -> EventResult {
        match self {
            Ok(v) => v.into_event_result(),
            Err(e) => EventResult::Failed(ListenerFailure::from(e.into())),
        }
    }
}

// =============================================================================
// Dispatch result
// =============================================================================

/// A recorded listener result.
#[derive(Debug, Clone)]
pub struct ListenerOutcome {
    /// Id of the listener that produced the result.
    pub listener: Id,
    /// The result itself.
    pub result: EventResult,
}

/// The aggregated result of one dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    /// Recorded outcomes in invocation order.
    pub outcomes: Vec<ListenerOutcome>,
    /// True if a processing interceptor stopped the chain.
    pub short_circuited: bool,
}

impl DispatchResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a result from outcomes.
    pub fn from_outcomes(outcomes: Vec<ListenerOutcome>) -> Self {
        Self {
            outcomes,
            short_circuited: false,
        }
    }

    /// Contents of all value results, in invocation order.
    pub fn contents(&self) -> Vec<&Value> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.content())
            .collect()
    }

    /// Outcomes whose handler failed.
    pub fn failures(&self) -> Vec<&ListenerOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_failed()).collect()
    }

    /// Ids of the listeners that produced an outcome, in invocation order.
    pub fn listeners(&self) -> Vec<&Id> {
        self.outcomes.iter().map(|o| &o.listener).collect()
    }

    /// Returns true if no outcome was recorded.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Waits for every async outcome and replaces it by its real result.
    pub async fn settle(self) -> Self {
        let mut outcomes = Vec::with_capacity(self.outcomes.len());
        for outcome in self.outcomes {
            outcomes.push(ListenerOutcome {
                listener: outcome.listener,
                result: outcome.result.settle().await,
            });
        }
        Self {
            outcomes,
            short_circuited: self.short_circuited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_event_result_conversions() {
        assert_eq!(().into_event_result().content(), None);
        assert!(().into_event_result().is_valid());
        assert_eq!("pong".into_event_result().content(), Some(&json!("pong")));
        assert!(!None::<String>.into_event_result().is_valid());

        let failed: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let result = failed.into_event_result();
        assert!(result.is_failed());
        assert_eq!(result.failure().unwrap().message(), "boom");
        assert!(!result.failure().unwrap().is_panic());
    }

    #[test]
    fn test_truncation_only_marks_values() {
        assert!(EventResult::of(1).truncated().is_truncated());
        assert!(EventResult::truncate().is_truncated());
        assert!(!EventResult::Invalid.truncated().is_truncated());
    }

    #[test]
    fn test_panic_payloads() {
        let f = ListenerFailure::from_panic(Box::new("static message"));
        assert_eq!(f.message(), "static message");
        assert!(f.is_panic());

        let f = ListenerFailure::from_panic(Box::new(String::from("owned")));
        assert_eq!(f.message(), "owned");

        let f = ListenerFailure::from_panic(Box::new(42_u8));
        assert_eq!(f.message(), "handler panicked");
    }

    #[test]
    fn test_ready_handle() {
        let handle = AsyncHandle::ready(EventResult::of("done"));
        let result = tokio_test::block_on(handle.wait());
        assert_eq!(result.content(), Some(&json!("done")));
        assert!(handle.peek().is_some());
    }

    #[tokio::test]
    async fn test_spawned_handle_reports_panic() {
        let tracker = TaskTracker::new();
        let handle = AsyncHandle::spawn(&tracker, async {
            if true {
                panic!("async boom");
            }
            EventResult::Invalid
        });
        let clone = handle.clone();

        let result = handle.wait().await;
        assert!(result.failure().unwrap().is_panic());
        assert_eq!(result.failure().unwrap().message(), "async boom");
        assert!(clone.wait().await.is_failed());
    }

    #[tokio::test]
    async fn test_dispatch_result_settles_async_outcomes() {
        let tracker = TaskTracker::new();
        let result = DispatchResult::from_outcomes(vec![
            ListenerOutcome {
                listener: Id::from(1_i64),
                result: EventResult::of("sync"),
            },
            ListenerOutcome {
                listener: Id::from(2_i64),
                result: EventResult::Async(AsyncHandle::spawn(&tracker, async {
                    EventResult::of("async")
                })),
            },
        ]);
        assert_eq!(result.contents(), vec![&json!("sync")]);

        let settled = result.settle().await;
        assert_eq!(settled.contents(), vec![&json!("sync"), &json!("async")]);
        assert!(settled.failures().is_empty());
    }
}
