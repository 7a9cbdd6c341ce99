//! Identifier service.
//!
//! An [`Id`] tags listeners, interceptors, bots and message targets. It is an
//! opaque, cheaply cloned literal string with value semantics: two ids built
//! from equal inputs are always equal, and a numeric id equals the literal id
//! of its decimal representation.
//!
//! ```rust,ignore
//! use chime_core::Id;
//!
//! let a = Id::literal("ping-listener")?;
//! let b = Id::from(10001_i64);
//! assert_eq!(b, Id::literal("10001")?);
//!
//! let r = Id::random();
//! assert_ne!(r, Id::random());
//! ```

use std::fmt::{self, Debug, Display};
use std::str::FromStr;
use std::sync::Arc;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{IdError, IdResult};

/// An opaque, comparable and hashable identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(Arc<str>);

impl Id {
    /// Creates an identifier from a literal value.
    ///
    /// Fails with [`IdError::Invalid`] when `value` is empty or blank.
    pub fn literal(value: impl AsRef<str>) -> IdResult<Self> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(IdError::Invalid {
                reason: "value is empty",
            });
        }
        if value.trim().is_empty() {
            return Err(IdError::Invalid {
                reason: "value is blank",
            });
        }
        Ok(Self(Arc::from(value)))
    }

    /// Creates a process-unique random identifier (UUID v4).
    pub fn random() -> Self {
        Self(Arc::from(Uuid::new_v4().simple().to_string()))
    }

    /// Returns the literal value of this identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the literal as a signed integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:?})", &*self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::literal(s)
    }
}

impl TryFrom<&str> for Id {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::literal(value)
    }
}

impl TryFrom<String> for Id {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::literal(value)
    }
}

macro_rules! impl_numeric_id {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Id {
                fn from(value: $ty) -> Self {
                    Self(Arc::from(value.to_string()))
                }
            }
        )*
    };
}

impl_numeric_id!(i32, i64, u32, u64, usize);

// ============================================================================
// Serde
// ============================================================================

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

struct IdVisitor;

impl Visitor<'_> for IdVisitor {
    type Value = Id;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-blank string or an integer identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Id, E> {
        Id::literal(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Id, E> {
        Ok(Id::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Id, E> {
        Ok(Id::from(v))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_literal_is_deterministic() {
        let a = Id::literal("listener-1").unwrap();
        let b = Id::literal(String::from("listener-1")).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_numeric_equals_decimal_literal() {
        assert_eq!(Id::from(123_i64), Id::literal("123").unwrap());
        assert_eq!(Id::from(123_u32), Id::from(123_i64));
        assert_eq!(Id::from(-7_i32).as_i64(), Some(-7));
    }

    #[test]
    fn test_blank_literal_rejected() {
        assert!(matches!(Id::literal(""), Err(IdError::Invalid { .. })));
        assert!(matches!(Id::literal("   "), Err(IdError::Invalid { .. })));
        assert!("".parse::<Id>().is_err());
    }

    #[test]
    fn test_random_ids_do_not_collide() {
        let ids: HashSet<Id> = (0..1000).map(|_| Id::random()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_serde_accepts_strings_and_integers() {
        let id: Id = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");

        let id: Id = serde_json::from_str("42").unwrap();
        assert_eq!(id, Id::from(42_u64));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");

        assert!(serde_json::from_str::<Id>("\"\"").is_err());
    }
}
