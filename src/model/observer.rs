//! Tab model observer interface.

use crate::identifiers::TabId;
use crate::tab::{Tab, TabLaunchType};

/// Receives lifecycle notifications from a [`TabModel`](super::TabModel).
///
/// Every method defaults to a no-op so implementors override only what they
/// need. Callbacks run after the model has released its internal lock, so
/// an observer may query the model it observes.
pub trait TabModelObserver: Send + Sync {
    /// A tab was inserted.
    fn did_add_tab(&self, _tab: &Tab, _launch_type: TabLaunchType) {}

    /// The active tab changed. `last_id` is the previously active tab.
    fn did_select_tab(&self, _tab: &Tab, _last_id: TabId) {}

    /// A tab is about to close.
    fn will_close_tab(&self, _tab: &Tab, _animate: bool) {}

    /// A tab was removed and destroyed.
    fn did_close_tab(&self, _tab_id: TabId, _incognito: bool) {}

    /// A tab was moved from `old_index` to `new_index`.
    fn did_move_tab(&self, _tab: &Tab, _new_index: usize, _old_index: usize) {}

    /// A tab left the visible sequence but can still be restored.
    fn tab_pending_closure(&self, _tab: &Tab) {}

    /// Every visible tab was marked pending closure in one batch.
    ///
    /// Fires before the per-tab [`tab_pending_closure`](Self::tab_pending_closure)
    /// calls of the same batch.
    fn all_tabs_pending_closure(&self, _tab_ids: &[TabId]) {}

    /// A pending closure was cancelled.
    fn tab_closure_undone(&self, _tab: &Tab) {}

    /// A pending closure became permanent.
    fn tab_closure_committed(&self, _tab: &Tab) {}
}
