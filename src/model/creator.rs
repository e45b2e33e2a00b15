//! Tab creation interfaces implemented by the embedding UI layer.

use std::sync::Arc;

use crate::error::Result;
use crate::identifiers::TabId;
use crate::tab::{Tab, TabLaunchType, TabState};

/// Materializes live tabs and inserts them into a model.
///
/// One creator exists per profile. Implementations are expected to add the
/// tab they create to the matching [`TabModel`](super::TabModel).
pub trait TabCreator: Send + Sync {
    /// Returns `true` if tabs appear in the model after the call returns.
    ///
    /// The store then moves a tab reopened during restore to its saved
    /// position once the model reports it added.
    fn creates_tabs_asynchronously(&self) -> bool;

    /// Opens a tab that navigates to `url`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the store treats a failure as a dropped tab.
    fn create_new_tab(&self, url: &str, launch_type: TabLaunchType, parent: Option<&Tab>)
    -> Result<Tab>;

    /// Recreates a tab from persisted state at visible `index`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the store treats a failure as a dropped tab.
    fn create_frozen_tab(&self, state: TabState, id: TabId, index: usize) -> Result<Tab>;
}

/// Hands out the creator for a profile.
pub trait TabCreatorManager: Send + Sync {
    /// Returns the creator for regular or incognito tabs.
    fn tab_creator(&self, incognito: bool) -> Arc<dyn TabCreator>;
}
