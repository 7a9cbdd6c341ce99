//! # Chime Core
//!
//! The data model of the Chime bot framework.
//!
//! This crate holds the types every other Chime crate and every platform
//! connector agrees on:
//!
//! - **Identifiers**: opaque, hashable ids for listeners, interceptors and bots ([`Id`])
//! - **Priority**: total dispatch order with named tiers ([`Priority`])
//! - **Messages**: immutable segment sequences with a stable JSON form ([`Message`], [`Segment`])
//! - **Events**: type-erased events keyed by a hierarchical [`EventKey`] ([`Event`], [`BoxedEvent`])
//!
//! Dispatch itself (listeners, interceptors, the listener manager) lives in
//! `chime-framework`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chime_core::{BoxedEvent, Event, EventKey, Id, Message, MessageSegment, Segment};
//! use std::any::Any;
//!
//! static PING: EventKey = EventKey::root("ping");
//!
//! struct Ping {
//!     message: Message,
//! }
//!
//! impl Event for Ping {
//!     fn key(&self) -> &'static EventKey {
//!         &PING
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//!
//!     fn message(&self) -> Option<&Message> {
//!         Some(&self.message)
//!     }
//! }
//!
//! let event = BoxedEvent::new(Ping {
//!     message: Segment::text("hi ") + Segment::at(Id::from(10001_i64)),
//! });
//! assert_eq!(event.message().unwrap().plain_text(), "hi ");
//! ```

pub mod error;
pub mod event;
pub mod id;
pub mod message;
pub mod priority;

pub use error::{IdError, IdResult, MessageError, MessageResult};
pub use event::{BoxedEvent, Event, EventKey};
pub use id::Id;
pub use message::{Message, MessageSegment, Segment};
pub use priority::Priority;
