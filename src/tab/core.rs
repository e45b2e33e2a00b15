//! Core Tab struct and accessors.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TabId;

use super::state::{NavigationEntry, TabState, now_millis};

// ============================================================================
// TabLaunchType
// ============================================================================

/// How a tab came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabLaunchType {
    /// Opened from a link in another tab.
    FromLink,
    /// Opened by an external application.
    FromExternalApp,
    /// Opened from the menu or the tab switcher.
    FromMenuOrOverview,
    /// Opened in the background from a context menu.
    FromLongpress,
    /// Recreated from persisted state.
    FromRestore,
    /// Opened by browser UI (new tab page, settings).
    FromChromeUi,
}

// ============================================================================
// Types
// ============================================================================

/// Mutable navigation data of a tab.
#[derive(Debug)]
struct TabData {
    /// Navigation history, `None` until the first real navigation.
    state: Option<TabState>,
    /// URL to load on first use when no state exists.
    pending_url: Option<String>,
}

/// Internal shared state for a tab.
pub(crate) struct TabInner {
    /// Tab ID.
    pub id: TabId,
    /// Profile flag, fixed at creation.
    pub incognito: bool,
    /// Tab that spawned this one.
    pub parent_id: TabId,
    /// Creation path.
    pub launch_type: TabLaunchType,
    /// Navigation data.
    data: Mutex<TabData>,
    /// State changed since the last blob write.
    needs_save: AtomicBool,
    /// Restored from a blob and not navigated since.
    frozen: AtomicBool,
    /// Permanently closed.
    destroyed: AtomicBool,
}

// ============================================================================
// Tab
// ============================================================================

/// A handle to one browsing session.
///
/// Clones share the same underlying tab.
#[derive(Clone)]
pub struct Tab {
    pub(crate) inner: Arc<TabInner>,
}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tab")
            .field("id", &self.inner.id)
            .field("incognito", &self.inner.incognito)
            .field("parent_id", &self.inner.parent_id)
            .field("launch_type", &self.inner.launch_type)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Tab {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Tab {}

// ============================================================================
// Tab - Constructors
// ============================================================================

impl Tab {
    fn build(
        id: TabId,
        incognito: bool,
        parent_id: TabId,
        launch_type: TabLaunchType,
        data: TabData,
        needs_save: bool,
        frozen: bool,
    ) -> Self {
        Self {
            inner: Arc::new(TabInner {
                id,
                incognito,
                parent_id,
                launch_type,
                data: Mutex::new(data),
                needs_save: AtomicBool::new(needs_save),
                frozen: AtomicBool::new(frozen),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a tab that has navigated to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` does not parse.
    pub fn new(
        id: TabId,
        incognito: bool,
        parent_id: TabId,
        launch_type: TabLaunchType,
        url: &str,
    ) -> Result<Self> {
        let url = parse_url(url)?;
        let mut state = TabState::with_entry(url, "", incognito);
        state.parent_id = parent_id;

        debug!(tab_id = %id, incognito, "Tab created");
        Ok(Self::build(
            id,
            incognito,
            parent_id,
            launch_type,
            TabData {
                state: Some(state),
                pending_url: None,
            },
            true,
            false,
        ))
    }

    /// Recreates a tab from persisted state.
    ///
    /// The profile flag and parent come from the state itself.
    #[must_use]
    pub fn frozen_from_state(id: TabId, state: TabState) -> Self {
        debug!(tab_id = %id, incognito = state.incognito, "Frozen tab created");
        Self::build(
            id,
            state.incognito,
            state.parent_id,
            TabLaunchType::FromRestore,
            TabData {
                state: Some(state),
                pending_url: None,
            },
            false,
            true,
        )
    }

    /// Creates a placeholder tab that loads `url` on first use.
    ///
    /// No state exists until the first navigation.
    #[must_use]
    pub fn for_lazy_load(
        id: TabId,
        incognito: bool,
        parent_id: TabId,
        launch_type: TabLaunchType,
        url: impl Into<String>,
    ) -> Self {
        debug!(tab_id = %id, incognito, "Lazy tab created");
        Self::build(
            id,
            incognito,
            parent_id,
            launch_type,
            TabData {
                state: None,
                pending_url: Some(url.into()),
            },
            false,
            false,
        )
    }
}

// ============================================================================
// Tab - Accessors
// ============================================================================

impl Tab {
    /// Returns the tab ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TabId {
        self.inner.id
    }

    /// Returns `true` for incognito tabs.
    #[inline]
    #[must_use]
    pub fn is_incognito(&self) -> bool {
        self.inner.incognito
    }

    /// Returns the ID of the tab that opened this one.
    #[inline]
    #[must_use]
    pub fn parent_id(&self) -> TabId {
        self.inner.parent_id
    }

    /// Returns how the tab was created.
    #[inline]
    #[must_use]
    pub fn launch_type(&self) -> TabLaunchType {
        self.inner.launch_type
    }

    /// Returns the current URL, or the pending URL of a lazy tab.
    #[must_use]
    pub fn url(&self) -> String {
        let data = self.inner.data.lock();
        match (&data.state, &data.pending_url) {
            (Some(state), _) => state.virtual_url().to_string(),
            (None, Some(url)) => url.clone(),
            (None, None) => String::new(),
        }
    }

    /// Returns the current page title.
    #[must_use]
    pub fn title(&self) -> String {
        self.inner
            .data
            .lock()
            .state
            .as_ref()
            .map(|state| state.display_title().to_string())
            .unwrap_or_default()
    }

    /// Returns a copy of the navigation state, if any.
    #[must_use]
    pub fn state(&self) -> Option<TabState> {
        self.inner.data.lock().state.clone()
    }

    /// Returns `true` if restored from disk and not navigated since.
    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Returns `true` if the tab has no navigation state yet.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.inner.data.lock().state.is_none()
    }

    /// Returns `true` if the state changed since the last blob write.
    #[inline]
    #[must_use]
    pub fn needs_save(&self) -> bool {
        self.inner.needs_save.load(Ordering::Acquire)
    }

    /// Returns `true` once the tab has been permanently closed.
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Tab - Navigation
// ============================================================================

impl Tab {
    /// Navigates to `url`, dropping any forward history.
    ///
    /// # Errors
    ///
    /// - [`Error::TabDestroyed`] if the tab was closed
    /// - [`Error::InvalidUrl`] if `url` does not parse
    pub fn load_url(&self, url: &str, title: impl Into<String>) -> Result<()> {
        self.ensure_alive()?;
        let url = parse_url(url)?;

        {
            let mut data = self.inner.data.lock();
            let incognito = self.inner.incognito;
            let parent_id = self.inner.parent_id;
            let state = data.state.get_or_insert_with(|| TabState {
                parent_id,
                ..TabState::with_entry(String::new(), "", incognito)
            });

            if state.current_entry().is_some_and(|e| !e.url.is_empty()) {
                state.navigations.truncate(state.current_index + 1);
                state.navigations.push(NavigationEntry::new(url, title));
                state.current_index = state.navigations.len() - 1;
            } else {
                state.navigations = vec![NavigationEntry::new(url, title)];
                state.current_index = 0;
            }
            state.timestamp_millis = now_millis();
            data.pending_url = None;
        }

        debug!(tab_id = %self.inner.id, "Tab navigated");
        self.mark_changed();
        Ok(())
    }

    /// Returns `true` if there is an earlier history entry.
    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.inner
            .data
            .lock()
            .state
            .as_ref()
            .is_some_and(|state| state.current_index > 0)
    }

    /// Returns `true` if there is a later history entry.
    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        self.inner
            .data
            .lock()
            .state
            .as_ref()
            .is_some_and(|state| state.current_index + 1 < state.navigations.len())
    }

    /// Moves one entry back in history. Returns `false` at the start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TabDestroyed`] if the tab was closed.
    pub fn go_back(&self) -> Result<bool> {
        self.step_history(-1)
    }

    /// Moves one entry forward in history. Returns `false` at the end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TabDestroyed`] if the tab was closed.
    pub fn go_forward(&self) -> Result<bool> {
        self.step_history(1)
    }

    fn step_history(&self, delta: isize) -> Result<bool> {
        self.ensure_alive()?;
        let moved = {
            let mut data = self.inner.data.lock();
            match data.state.as_mut() {
                Some(state) => {
                    let target = state.current_index as isize + delta;
                    if target >= 0 && (target as usize) < state.navigations.len() {
                        state.current_index = target as usize;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if moved {
            self.mark_changed();
        }
        Ok(moved)
    }
}

// ============================================================================
// Tab - Internal
// ============================================================================

impl Tab {
    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::tab_destroyed(self.inner.id));
        }
        Ok(())
    }

    fn mark_changed(&self) {
        self.inner.frozen.store(false, Ordering::Release);
        self.inner.needs_save.store(true, Ordering::Release);
    }

    /// Clears the dirty flag after the blob was written.
    pub(crate) fn mark_saved(&self) {
        self.inner.needs_save.store(false, Ordering::Release);
    }

    /// Restores the dirty flag after a failed write.
    pub(crate) fn mark_needs_save(&self) {
        self.inner.needs_save.store(true, Ordering::Release);
    }

    /// Marks the tab as permanently closed.
    pub(crate) fn destroy(&self) {
        if !self.inner.destroyed.swap(true, Ordering::AcqRel) {
            debug!(tab_id = %self.inner.id, "Tab destroyed");
        }
    }
}

fn parse_url(url: &str) -> Result<String> {
    Url::parse(url)
        .map(String::from)
        .map_err(|e| Error::invalid_url(url, e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
