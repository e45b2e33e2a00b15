//! Persistent store observer interface.

use crate::identifiers::TabId;

/// Receives restore and save milestones from a
/// [`TabPersistentStore`](super::TabPersistentStore).
///
/// Every method defaults to a no-op. Callbacks may run on a runtime worker
/// thread, never while the store holds an internal lock.
pub trait TabPersistentStoreObserver: Send + Sync {
    /// The metadata file was read. `tab_count_at_startup` counts every entry.
    ///
    /// Fires after the last [`on_details_read`](Self::on_details_read).
    fn on_initialized(&self, _tab_count_at_startup: usize) {}

    /// One metadata entry was read, in file order.
    fn on_details_read(
        &self,
        _index: usize,
        _id: TabId,
        _url: &str,
        _is_standard_active_index: bool,
        _is_incognito_active_index: bool,
    ) {
    }

    /// Every entry has been restored or skipped.
    fn on_state_loaded(&self) {}

    /// An asynchronous metadata write finished successfully.
    fn on_metadata_saved_asynchronously(&self) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStoreObserver;

impl TabPersistentStoreObserver for NoopStoreObserver {}
