//! Message types for the Chime framework.
//!
//! The message system is built around two abstractions:
//! - [`MessageSegment`]: a single unit of content (text, mention, face, ...)
//! - [`Message<S>`]: an ordered, immutable sequence of segments
//!
//! [`Segment`] is the built-in closed segment type. Its JSON form carries a
//! `"type"` discriminator next to the variant fields:
//!
//! ```json
//! [{"type":"text","text":"hello "},{"type":"at","target":"10001"}]
//! ```
//!
//! Connectors that need richer content may define their own segment type and
//! use `Message<TheirSegment>`.

use std::fmt::{self, Debug, Display};
use std::ops::{Add, Deref};

use serde::{Deserialize, Serialize};

use crate::error::{MessageError, MessageResult};
use crate::id::Id;

// ============================================================================
// Message Segment Trait
// ============================================================================

/// A single segment of a message.
///
/// A segment is the smallest unit of content in a message. It can be plain
/// text, a mention, an image reference, etc.
pub trait MessageSegment: Debug + Clone + PartialEq + Display + Send + Sync + 'static {
    /// Creates a plain text segment.
    fn text(text: impl Into<String>) -> Self;

    /// Returns the type identifier of this segment (e.g. "text", "at").
    fn segment_type(&self) -> &str;

    /// Returns true if this is a plain text segment.
    fn is_text(&self) -> bool {
        self.segment_type() == "text"
    }

    /// Returns the text content if this is a text segment.
    fn as_text(&self) -> Option<&str>;
}

// ============================================================================
// Built-in Segment
// ============================================================================

/// The built-in, platform-agnostic segment type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text content.
    Text {
        /// The text itself.
        text: String,
    },
    /// A mention of a single user.
    At {
        /// Whom to mention.
        target: Id,
    },
    /// A mention of everyone in the current channel or group.
    AtAll,
    /// A platform face (built-in sticker).
    Face {
        /// Platform face id.
        id: Id,
    },
    /// An emoji, either unicode or platform-custom.
    Emoji {
        /// Emoji id.
        id: Id,
    },
    /// An image reference. The id is resolved by the connector.
    Image {
        /// Resource id.
        id: Id,
    },
}

impl Segment {
    /// Creates a mention segment.
    pub fn at(target: impl Into<Id>) -> Self {
        Segment::At {
            target: target.into(),
        }
    }

    /// Creates a face segment.
    pub fn face(id: impl Into<Id>) -> Self {
        Segment::Face { id: id.into() }
    }

    /// Creates an emoji segment.
    pub fn emoji(id: impl Into<Id>) -> Self {
        Segment::Emoji { id: id.into() }
    }

    /// Creates an image segment.
    pub fn image(id: impl Into<Id>) -> Self {
        Segment::Image { id: id.into() }
    }
}

impl MessageSegment for Segment {
    fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    fn segment_type(&self) -> &str {
        match self {
            Segment::Text { .. } => "text",
            Segment::At { .. } => "at",
            Segment::AtAll => "at_all",
            Segment::Face { .. } => "face",
            Segment::Emoji { .. } => "emoji",
            Segment::Image { .. } => "image",
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text { text } => f.write_str(text),
            Segment::At { target } => write!(f, "@{target}"),
            Segment::AtAll => f.write_str("@all"),
            Segment::Face { id } => write!(f, "[Face: {id}]"),
            Segment::Emoji { id } => write!(f, "[Emoji: {id}]"),
            Segment::Image { id } => write!(f, "[Image: {id}]"),
        }
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Segment::text(value)
    }
}

impl From<String> for Segment {
    fn from(value: String) -> Self {
        Segment::text(value)
    }
}

// ============================================================================
// Message
// ============================================================================

/// An ordered, immutable sequence of segments.
///
/// Equality is structural. Combining messages always produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message<S: MessageSegment = Segment> {
    #[serde(bound(
        serialize = "S: Serialize",
        deserialize = "S: Deserialize<'de>"
    ))]
    segments: Vec<S>,
}

impl<S: MessageSegment> Message<S> {
    /// Creates an empty message.
    pub const fn empty() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Composes a message from segments, preserving their order.
    pub fn compose(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    /// Creates a message holding a single text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![S::text(text)],
        }
    }

    /// Returns a new message with `segment` appended.
    pub fn with(&self, segment: S) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment);
        Self { segments }
    }

    /// Concatenates the text content of all text segments.
    pub fn plain_text(&self) -> String {
        self.segments.iter().filter_map(|s| s.as_text()).collect()
    }

    /// Returns the segments as a slice.
    pub fn segments(&self) -> &[S] {
        &self.segments
    }

    /// Consumes the message and returns its segments.
    pub fn into_segments(self) -> Vec<S> {
        self.segments
    }
}

impl<S> Message<S>
where
    S: MessageSegment + Serialize + for<'de> Deserialize<'de>,
{
    /// Serializes the message to its canonical JSON array form.
    pub fn to_json(&self) -> MessageResult<String> {
        serde_json::to_string(self).map_err(MessageError::Encode)
    }

    /// Parses a message from JSON.
    ///
    /// Fails with [`MessageError::Malformed`] on an unknown discriminator,
    /// a missing field or a field of the wrong shape.
    pub fn from_json(json: &str) -> MessageResult<Self> {
        serde_json::from_str(json).map_err(MessageError::Malformed)
    }

    /// Converts the message into a JSON value.
    pub fn to_value(&self) -> MessageResult<serde_json::Value> {
        serde_json::to_value(self).map_err(MessageError::Encode)
    }
}

impl<S: MessageSegment> Default for Message<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: MessageSegment> Deref for Message<S> {
    type Target = [S];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

impl<S: MessageSegment> Display for Message<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl<S: MessageSegment> From<Vec<S>> for Message<S> {
    fn from(segments: Vec<S>) -> Self {
        Self { segments }
    }
}

impl From<Segment> for Message<Segment> {
    fn from(segment: Segment) -> Self {
        Self {
            segments: vec![segment],
        }
    }
}

impl<S: MessageSegment> FromIterator<S> for Message<S> {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::compose(iter)
    }
}

impl<S: MessageSegment> IntoIterator for Message<S> {
    type Item = S;
    type IntoIter = std::vec::IntoIter<S>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.into_iter()
    }
}

impl<'a, S: MessageSegment> IntoIterator for &'a Message<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl<S: MessageSegment> Add for Message<S> {
    type Output = Message<S>;

    fn add(mut self, rhs: Message<S>) -> Self::Output {
        self.segments.extend(rhs.segments);
        self
    }
}

impl<S: MessageSegment> Add<&Message<S>> for &Message<S> {
    type Output = Message<S>;

    fn add(self, rhs: &Message<S>) -> Self::Output {
        self.segments.iter().chain(rhs.segments.iter()).cloned().collect()
    }
}

impl Add<Segment> for Message<Segment> {
    type Output = Message<Segment>;

    fn add(mut self, rhs: Segment) -> Self::Output {
        self.segments.push(rhs);
        self
    }
}

impl Add<Segment> for Segment {
    type Output = Message<Segment>;

    fn add(self, rhs: Segment) -> Self::Output {
        Message::compose([self, rhs])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::compose([
            Segment::text("hello "),
            Segment::at(10001_i64),
            Segment::AtAll,
            Segment::face(Id::literal("smile").unwrap()),
            Segment::emoji(42_u32),
            Segment::image(Id::literal("res/cat.png").unwrap()),
        ])
    }

    #[test]
    fn test_compose_preserves_order_without_dedup() {
        let msg = Message::compose([
            Segment::text("a"),
            Segment::text("a"),
            Segment::text("b"),
        ]);
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.plain_text(), "aab");
    }

    #[test]
    fn test_json_round_trip() {
        let msg = sample();
        let json = msg.to_json().unwrap();
        let back = Message::from_json(&json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(msg, back);

        let empty = Message::<Segment>::empty();
        assert_eq!(Message::from_json(&empty.to_json().unwrap()).unwrap(), empty);
    }

    #[test]
    fn test_json_shape_carries_discriminator() {
        let msg = Segment::text("hi") + Segment::at(7_i64);
        let value = msg.to_value().unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"type": "text", "text": "hi"},
                {"type": "at", "target": "7"}
            ])
        );
    }

    #[test]
    fn test_malformed_json_rejected() {
        let unknown = r#"[{"type":"text","text":"x"},{"type":"poke"}]"#;
        assert!(matches!(
            Message::<Segment>::from_json(unknown),
            Err(MessageError::Malformed(_))
        ));

        let missing = r#"[{"type":"at"}]"#;
        assert!(matches!(
            Message::<Segment>::from_json(missing),
            Err(MessageError::Malformed(_))
        ));

        let blank_target = r#"[{"type":"at","target":" "}]"#;
        assert!(Message::<Segment>::from_json(blank_target).is_err());
    }

    #[test]
    fn test_concatenation_is_non_destructive() {
        let a: Message = Message::text("foo");
        let b: Message = Message::text("bar");
        let joined = &a + &b;
        assert_eq!(joined.plain_text(), "foobar");
        assert_eq!(a.len(), 1);

        let extended = a.with(Segment::AtAll);
        assert_eq!(a.len(), 1);
        assert_eq!(extended.len(), 2);
        assert_eq!(extended.to_string(), "foo@all");
    }

    #[test]
    fn test_structural_equality() {
        let a = Message::compose([Segment::text("x"), Segment::at(1_i64)]);
        let b: Message = vec![Segment::text("x"), Segment::at(1_i64)].into();
        let c = Message::compose([Segment::at(1_i64), Segment::text("x")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
