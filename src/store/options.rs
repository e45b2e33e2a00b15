//! Persistent store configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tab_persistence::StoreOptions;
//!
//! let options = StoreOptions::new()
//!     .with_selector_index(1)
//!     .with_save_delay(Duration::from_millis(250))
//!     .with_prioritize_active_tab(false);
//!
//! assert_eq!(options.selector_index, 1);
//! ```

use std::time::Duration;

// ============================================================================
// StoreOptions
// ============================================================================

/// Tunables of a [`TabPersistentStore`](super::TabPersistentStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Window/instance whose files the store owns.
    pub selector_index: u32,

    /// Restore the active tab before the others.
    pub prioritize_active_tab: bool,

    /// Time the writer waits after a wake-up before snapshotting, so bursts
    /// of mutations collapse into one write.
    pub save_delay: Duration,

    /// Delete unreferenced tab state files after a restore.
    pub clean_up_orphans: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl StoreOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            selector_index: 0,
            prioritize_active_tab: true,
            save_delay: Duration::ZERO,
            clean_up_orphans: true,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl StoreOptions {
    /// Sets the selector index.
    #[inline]
    #[must_use]
    pub fn with_selector_index(mut self, selector_index: u32) -> Self {
        self.selector_index = selector_index;
        self
    }

    /// Enables or disables restoring the active tab first.
    #[inline]
    #[must_use]
    pub fn with_prioritize_active_tab(mut self, enabled: bool) -> Self {
        self.prioritize_active_tab = enabled;
        self
    }

    /// Sets the coalescing delay of asynchronous saves.
    #[inline]
    #[must_use]
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /// Enables or disables orphan cleanup after restore.
    #[inline]
    #[must_use]
    pub fn with_clean_up_orphans(mut self, enabled: bool) -> Self {
        self.clean_up_orphans = enabled;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
