//! Continuous sessions.
//!
//! A handler can suspend until a later event matching a predicate is
//! dispatched:
//!
//! ```rust,ignore
//! ListenerBuilder::new(&MESSAGE)
//!     .asynchronous()
//!     .handle(|ctx: ListenerContext| async move {
//!         let answer = ctx
//!             .sessions()
//!             .waiting_for_next_message(|_, msg| msg.plain_text() == "yes")
//!             .wait_timeout(Duration::from_secs(30))
//!             .await?;
//!         Ok::<_, SessionError>(answer.message().map(|m| m.plain_text()))
//!     })
//! ```
//!
//! Every dispatch offers its event to the pending sessions before the
//! processing interceptors run. Each matching session is resumed with the
//! event and removed. The event is still dispatched to listeners as usual.
//!
//! A session awaited by a blocking listener holds up the dispatch that
//! invoked it, so waiting listeners are usually asynchronous.

use std::fmt;
use std::time::Duration;

use chime_core::{BoxedEvent, Id, Message};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::context::EventContext;
use crate::error::SessionError;

type SessionMatcher = Box<dyn Fn(&EventContext) -> bool + Send + Sync>;

struct Waiter {
    id: Id,
    matcher: SessionMatcher,
    sender: oneshot::Sender<BoxedEvent>,
}

/// The pending continuous sessions of one listener manager.
///
/// Matchers run while the session list is locked. They must not create or
/// cancel sessions.
#[derive(Default)]
pub struct ContinuousSessions {
    waiters: Mutex<Vec<Waiter>>,
}

impl ContinuousSessions {
    /// Creates an empty session list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session resumed by the next event accepted by `matcher`.
    pub fn waiting_for_next<F>(&self, matcher: F) -> ContinuousSession
    where
        F: Fn(&EventContext) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let id = Id::random();
        self.waiters.lock().push(Waiter {
            id: id.clone(),
            matcher: Box::new(matcher),
            sender,
        });
        debug!(session = %id, "Continuous session waiting");
        ContinuousSession { id, receiver }
    }

    /// Like [`waiting_for_next`](Self::waiting_for_next), restricted to
    /// events carrying a message.
    pub fn waiting_for_next_message<F>(&self, matcher: F) -> ContinuousSession
    where
        F: Fn(&EventContext, &Message) -> bool + Send + Sync + 'static,
    {
        self.waiting_for_next(move |ctx| {
            ctx.event()
                .message()
                .is_some_and(|message| matcher(ctx, message))
        })
    }

    /// Cancels the session `id`. Its waiter fails with [`SessionError::Closed`].
    pub fn cancel(&self, id: &Id) -> bool {
        let mut waiters = self.waiters.lock();
        let before = waiters.len();
        waiters.retain(|w| &w.id != id);
        before != waiters.len()
    }

    /// Number of sessions still waiting.
    pub fn len(&self) -> usize {
        self.waiters
            .lock()
            .iter()
            .filter(|w| !w.sender.is_closed())
            .count()
    }

    /// Returns true if no session is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every pending session.
    pub fn clear(&self) {
        let closed = std::mem::take(&mut *self.waiters.lock());
        if !closed.is_empty() {
            debug!(sessions = closed.len(), "Continuous sessions closed");
        }
    }

    /// Resumes the sessions whose matcher accepts `ctx`. Returns how many
    /// were resumed.
    pub(crate) fn resume(&self, ctx: &EventContext) -> usize {
        let mut waiters = self.waiters.lock();
        if waiters.is_empty() {
            return 0;
        }

        let mut resumed = 0;
        let mut pending = Vec::with_capacity(waiters.len());
        for waiter in waiters.drain(..) {
            if waiter.sender.is_closed() {
                trace!(session = %waiter.id, "Session abandoned, dropping");
                continue;
            }
            if !(waiter.matcher)(ctx) {
                pending.push(waiter);
                continue;
            }
            if waiter.sender.send(ctx.event().clone()).is_ok() {
                debug!(session = %waiter.id, "Continuous session resumed");
                resumed += 1;
            }
        }
        *waiters = pending;
        resumed
    }
}

impl fmt::Debug for ContinuousSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousSessions")
            .field("pending", &self.len())
            .finish()
    }
}

/// A pending continuous session.
///
/// Dropping it abandons the session.
#[derive(Debug)]
pub struct ContinuousSession {
    id: Id,
    receiver: oneshot::Receiver<BoxedEvent>,
}

impl ContinuousSession {
    /// Id of the session, usable with [`ContinuousSessions::cancel`].
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Waits for the matching event.
    pub async fn wait(self) -> Result<BoxedEvent, SessionError> {
        let Self { id, receiver } = self;
        receiver
            .await
            .map_err(|_| SessionError::Closed { session: id })
    }

    /// Waits for the matching event for at most `timeout`.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<BoxedEvent, SessionError> {
        let Self { id, receiver } = self;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(SessionError::Closed { session: id }),
            Err(_) => Err(SessionError::Timeout {
                session: id,
                timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::{Event, EventKey};
    use std::any::Any;

    static SAID: EventKey = EventKey::root("said");

    struct Said(Message);

    impl Event for Said {
        fn key(&self) -> &'static EventKey {
            &SAID
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn message(&self) -> Option<&Message> {
            Some(&self.0)
        }
    }

    fn said(text: &str) -> EventContext {
        EventContext::new(BoxedEvent::new(Said(Message::text(text))))
    }

    #[tokio::test]
    async fn test_session_resumes_on_matching_event() {
        let sessions = ContinuousSessions::new();
        let session = sessions.waiting_for_next_message(|_, m| m.plain_text() == "yes");
        assert_eq!(sessions.len(), 1);

        assert_eq!(sessions.resume(&said("no")), 0);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.resume(&said("yes")), 1);
        assert!(sessions.is_empty());

        let event = session.wait().await.unwrap();
        assert_eq!(event.message().unwrap().plain_text(), "yes");
    }

    #[tokio::test]
    async fn test_every_matching_session_is_resumed() {
        let sessions = ContinuousSessions::new();
        let a = sessions.waiting_for_next(|_| true);
        let b = sessions.waiting_for_next(|ctx| ctx.event().message().is_none());

        assert_eq!(sessions.resume(&said("hi")), 1);
        assert!(a.wait().await.is_ok());
        assert_eq!(sessions.len(), 1);
        drop(b);
        assert!(sessions.is_empty());
        assert_eq!(sessions.resume(&said("hi")), 0);
    }

    #[tokio::test]
    async fn test_cancelled_and_cleared_sessions_close() {
        let sessions = ContinuousSessions::new();
        let cancelled = sessions.waiting_for_next(|_| true);
        let id = cancelled.id().clone();
        assert!(sessions.cancel(&id));
        assert!(!sessions.cancel(&id));
        assert!(matches!(
            cancelled.wait().await,
            Err(SessionError::Closed { session }) if session == id
        ));

        let cleared = sessions.waiting_for_next(|_| true);
        sessions.clear();
        assert!(matches!(
            cleared.wait().await,
            Err(SessionError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn test_session_times_out() {
        let sessions = ContinuousSessions::new();
        let session = sessions.waiting_for_next(|_| false);
        let err = session
            .wait_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
        assert!(sessions.is_empty());
    }
}
