//! Extractor system for the Chime framework.
//!
//! This module provides the [`FromContext`] trait, which defines how types
//! can be extracted from a [`ListenerContext`] for use as handler parameters.

use std::ops::Deref;
use std::sync::Arc;

use chime_core::{BoxedEvent, Event, Id, Message};

use crate::context::{EventContext, ListenerContext};
use crate::error::{ExtractError, ExtractResult};

/// A trait for types that can be extracted from a [`ListenerContext`].
///
/// Types implementing this trait can be used directly as handler function
/// parameters. If extraction fails the listener is skipped.
///
/// # Example
///
/// ```rust,ignore
/// struct Sender(Id);
///
/// impl FromContext for Sender {
///     fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
///         let event = ctx.event().downcast_ref::<GroupMessage>()
///             .ok_or(ExtractError::Missing("sender"))?;
///         Ok(Sender(event.sender.clone()))
///     }
/// }
/// ```
pub trait FromContext: Sized {
    /// Attempts to extract this type from the given context.
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self>;
}

impl FromContext for ListenerContext {
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
        Ok(ctx.clone())
    }
}

impl FromContext for Arc<EventContext> {
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx.event_context()))
    }
}

impl FromContext for BoxedEvent {
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
        Ok(ctx.event().clone())
    }
}

/// Extracts the message carried by the event.
impl FromContext for Message {
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
        ctx.event()
            .message()
            .cloned()
            .ok_or(ExtractError::Missing("message"))
    }
}

/// Implementation for `Option<T>` where `T: FromContext`.
///
/// This allows handlers to have optional parameters.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

// =============================================================================
// Typed event extraction
// =============================================================================

/// The dispatched event as its concrete type `E`.
///
/// ```rust,ignore
/// async fn on_ping(ping: EventOf<Ping>) -> String {
///     format!("pong from {}", ping.sender)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EventOf<E>(pub E);

impl<E> EventOf<E> {
    /// Unwraps the event.
    pub fn into_inner(self) -> E {
        self.0
    }
}

impl<E> Deref for EventOf<E> {
    type Target = E;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<E: Event + Clone> FromContext for EventOf<E> {
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
        ctx.event()
            .downcast_ref::<E>()
            .cloned()
            .map(EventOf)
            .ok_or_else(|| ExtractError::EventTypeMismatch {
                expected: std::any::type_name::<E>(),
                got: ctx.event().key().name(),
            })
    }
}

/// The id of the bot that received the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotId(pub Id);

impl FromContext for BotId {
    fn from_context(ctx: &ListenerContext) -> ExtractResult<Self> {
        ctx.event()
            .bot_id()
            .cloned()
            .map(BotId)
            .ok_or(ExtractError::Missing("bot id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::{EventKey, Priority};
    use std::any::Any;

    static PING: EventKey = EventKey::root("ping");
    static PONG: EventKey = EventKey::root("pong");

    #[derive(Debug, Clone)]
    struct Ping {
        message: Message,
    }

    impl Event for Ping {
        fn key(&self) -> &'static EventKey {
            &PING
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn message(&self) -> Option<&Message> {
            Some(&self.message)
        }
    }

    #[derive(Debug, Clone)]
    struct Pong;

    impl Event for Pong {
        fn key(&self) -> &'static EventKey {
            &PONG
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn ctx(event: impl Event) -> ListenerContext {
        ListenerContext::new(
            Arc::new(EventContext::new(BoxedEvent::new(event))),
            Id::from(1_i64),
            &PING,
            Priority::NORMAL,
        )
    }

    #[test]
    fn test_typed_event_extraction() {
        let ping = ctx(Ping {
            message: Message::text("hi"),
        });
        assert!(EventOf::<Ping>::from_context(&ping).is_ok());
        assert!(matches!(
            EventOf::<Pong>::from_context(&ping),
            Err(ExtractError::EventTypeMismatch { got: "ping", .. })
        ));
    }

    #[test]
    fn test_optional_and_missing_data() {
        let pong = ctx(Pong);
        assert!(matches!(
            Message::from_context(&pong),
            Err(ExtractError::Missing("message"))
        ));
        assert!(Option::<Message>::from_context(&pong).unwrap().is_none());
        assert!(BotId::from_context(&pong).is_err());

        let ping = ctx(Ping {
            message: Message::text("hi"),
        });
        assert_eq!(Message::from_context(&ping).unwrap().plain_text(), "hi");
    }
}
