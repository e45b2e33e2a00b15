//! Type-safe identifiers for tabs.
//!
//! Newtype wrappers prevent mixing tab IDs with indices and counts.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TabId`] | Process-unique tab identifier |
//! | [`TabIdAllocator`] | Injected source of fresh [`TabId`]s |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// TabId
// ============================================================================

/// Identifier of a tab.
///
/// Valid IDs are non-negative. [`TabId::INVALID`] (-1) denotes "no tab".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(i32);

impl TabId {
    /// Sentinel meaning "no tab".
    pub const INVALID: TabId = TabId(-1);

    /// Creates a tab ID, rejecting negative values.
    #[inline]
    #[must_use]
    pub const fn new(raw: i32) -> Option<Self> {
        if raw < 0 { None } else { Some(Self(raw)) }
    }

    /// Creates a tab ID, mapping negative values to [`TabId::INVALID`].
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        if raw < 0 { Self::INVALID } else { Self(raw) }
    }

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` unless this is [`TabId::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// TabIdAllocator
// ============================================================================

/// Thread-safe generator of process-unique tab IDs.
///
/// One allocator is shared by every model of a selector. After a restore
/// the allocator is advanced past every persisted ID so restored and fresh
/// tabs never collide.
#[derive(Debug, Default)]
pub struct TabIdAllocator {
    next: AtomicI32,
}

impl TabIdAllocator {
    /// Creates an allocator starting at zero.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicI32::new(0),
        }
    }

    /// Returns a fresh ID.
    pub fn generate(&self) -> TabId {
        TabId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Ensures the next generated ID is at least `min`.
    pub fn increment_to(&self, min: i32) {
        self.next.fetch_max(min, Ordering::Relaxed);
    }

    /// Returns the ID the next call to [`generate`](Self::generate) yields.
    #[must_use]
    pub fn peek(&self) -> i32 {
        self.next.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_negative() {
        assert!(TabId::new(-1).is_none());
        assert_eq!(TabId::new(3).map(TabId::as_i32), Some(3));
    }

    #[test]
    fn test_invalid_sentinel() {
        assert!(!TabId::INVALID.is_valid());
        assert_eq!(TabId::from_raw(-42), TabId::INVALID);
        assert_eq!(TabId::default(), TabId::INVALID);
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&TabId::from_raw(12)).unwrap();
        assert_eq!(json, "12");
        let id: TabId = serde_json::from_str("12").unwrap();
        assert_eq!(id, TabId::from_raw(12));
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let ids = TabIdAllocator::new();
        assert_eq!(ids.generate().as_i32(), 0);
        assert_eq!(ids.generate().as_i32(), 1);
    }

    #[test]
    fn test_increment_to_never_goes_backwards() {
        let ids = TabIdAllocator::new();
        ids.increment_to(10);
        assert_eq!(ids.generate().as_i32(), 10);
        ids.increment_to(5);
        assert_eq!(ids.generate().as_i32(), 11);
    }
}
