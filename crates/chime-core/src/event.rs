//! Event system for the Chime framework.
//!
//! - [`EventKey`] - the type tag of an event, with parent keys
//! - [`Event`] - base trait for all events
//! - [`BoxedEvent`] - cheaply cloneable, type-erased event
//!
//! # Event key hierarchy
//!
//! Every key may name parent keys. A listener registered on a key matches all
//! events whose key is that key or a descendant of it, and [`EventKey::ANY`]
//! is an implicit ancestor of every key:
//!
//! ```rust,ignore
//! static MESSAGE: EventKey = EventKey::root("message");
//! static GROUP_MESSAGE: EventKey = EventKey::new("message.group", &[&MESSAGE]);
//!
//! assert!(GROUP_MESSAGE.is_sub_of(&MESSAGE));
//! assert!(GROUP_MESSAGE.is_sub_of(&EventKey::ANY));
//! ```

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::id::Id;
use crate::message::Message;

// ============================================================================
// Event Key
// ============================================================================

/// The type tag of an event.
///
/// Keys compare and hash by name only.
#[derive(Clone, Copy)]
pub struct EventKey {
    name: &'static str,
    parents: &'static [&'static EventKey],
}

impl EventKey {
    /// The key every other key descends from.
    pub const ANY: EventKey = EventKey::root("any");

    /// Creates a key with the given parents.
    pub const fn new(name: &'static str, parents: &'static [&'static EventKey]) -> Self {
        Self { name, parents }
    }

    /// Creates a key without explicit parents.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parents: &[] }
    }

    /// Returns the key name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the direct parents of this key.
    pub const fn parents(&self) -> &'static [&'static EventKey] {
        self.parents
    }

    /// Returns true if this key equals `other` or descends from it.
    pub fn is_sub_of(&self, other: &EventKey) -> bool {
        if other.name == Self::ANY.name || self == other {
            return true;
        }
        self.parents.iter().any(|p| p.is_sub_of(other))
    }

    /// Returns this key followed by all its ancestors, nearest first, without
    /// duplicates. [`EventKey::ANY`] is always last.
    pub fn lineage(&self) -> Vec<EventKey> {
        let mut out: Vec<EventKey> = vec![*self];
        let mut cursor = 0;
        while cursor < out.len() {
            let current = out[cursor];
            for parent in current.parents {
                if !out.contains(*parent) {
                    out.push(**parent);
                }
            }
            cursor += 1;
        }
        out.retain(|k| *k != Self::ANY);
        out.push(Self::ANY);
        out
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventKey {}

impl Hash for EventKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKey({})", self.name)
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for all events dispatched through Chime.
///
/// Events are type-erased as `dyn Event` and can be downcast to concrete types
/// through [`as_any`](Event::as_any).
pub trait Event: Any + Send + Sync {
    /// Returns the type key of this event.
    fn key(&self) -> &'static EventKey;

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the message carried by this event, if any.
    fn message(&self) -> Option<&Message> {
        None
    }

    /// Returns the id of the bot that received this event, if known.
    fn bot_id(&self) -> Option<&Id> {
        None
    }
}

// ============================================================================
// Boxed Event
// ============================================================================

/// A shared, type-erased event.
#[derive(Clone)]
pub struct BoxedEvent(Arc<dyn Event>);

impl BoxedEvent {
    /// Wraps a concrete event.
    pub fn new<E: Event>(event: E) -> Self {
        Self(Arc::new(event))
    }

    /// Attempts to view the inner event as `E`.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.0.as_any().downcast_ref::<E>()
    }

    /// Returns true if the inner event is an `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.0.as_any().is::<E>()
    }

    /// Returns the inner shared pointer.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.0
    }
}

impl Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl From<Arc<dyn Event>> for BoxedEvent {
    fn from(value: Arc<dyn Event>) -> Self {
        Self(value)
    }
}

impl Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("key", self.0.key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageSegment, Segment};

    static MESSAGE: EventKey = EventKey::root("message");
    static CONTACT: EventKey = EventKey::root("contact");
    static GROUP: EventKey = EventKey::new("message.group", &[&MESSAGE]);
    static GROUP_AT: EventKey = EventKey::new("message.group.at", &[&GROUP, &CONTACT]);

    struct GroupMessage {
        message: Message,
        bot: Id,
    }

    impl Event for GroupMessage {
        fn key(&self) -> &'static EventKey {
            &GROUP
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn message(&self) -> Option<&Message> {
            Some(&self.message)
        }

        fn bot_id(&self) -> Option<&Id> {
            Some(&self.bot)
        }
    }

    #[test]
    fn test_key_hierarchy() {
        assert!(GROUP.is_sub_of(&GROUP));
        assert!(GROUP.is_sub_of(&MESSAGE));
        assert!(GROUP_AT.is_sub_of(&MESSAGE));
        assert!(GROUP_AT.is_sub_of(&CONTACT));
        assert!(!MESSAGE.is_sub_of(&GROUP));
        assert!(!GROUP.is_sub_of(&CONTACT));
        assert!(CONTACT.is_sub_of(&EventKey::ANY));
    }

    #[test]
    fn test_lineage_order() {
        let names: Vec<&str> = GROUP_AT.lineage().iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec!["message.group.at", "message.group", "contact", "message", "any"]
        );
        assert_eq!(EventKey::ANY.lineage(), vec![EventKey::ANY]);
    }

    #[test]
    fn test_boxed_event_downcast() {
        let event = BoxedEvent::new(GroupMessage {
            message: Message::text("ping"),
            bot: Id::from(1_i64),
        });

        assert!(event.is::<GroupMessage>());
        assert_eq!(event.key(), &GROUP);
        assert_eq!(event.message().map(|m| m.plain_text()), Some("ping".into()));
        assert_eq!(event.bot_id(), Some(&Id::from(1_i64)));

        let concrete = event.downcast_ref::<GroupMessage>().unwrap();
        assert_eq!(concrete.message, Message::compose([Segment::text("ping")]));
    }
}
