//! Dispatch priority.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A totally ordered dispatch priority. Lower values run earlier.
///
/// Entries with equal priority keep their registration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Runs before everything else.
    pub const FIRST: Self = Self(i32::MIN);
    /// Runs before the normal tier.
    pub const HIGH: Self = Self(-100);
    /// The default tier.
    pub const NORMAL: Self = Self(0);
    /// Runs after the normal tier.
    pub const LOW: Self = Self(100);
    /// Runs after everything else.
    pub const LAST: Self = Self(i32::MAX);

    /// Returns the raw value.
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
