//! Ordered tab collection for one profile.
//!
//! A [`TabModel`] keeps its tabs in an index-addressed list of slots. Each
//! slot is tagged [`ClosureState::Active`] or [`ClosureState::PendingClosure`];
//! pending slots keep their physical position, so cancelling a closure puts
//! the tab back between the same neighbours without reinsertion. Visible
//! indices count active slots only.
//!
//! ```text
//! slots:    [ 3 ][ 5 (pending) ][ 8 ][ 9 ]
//! visible:    0                   1    2
//! ```
//!
//! Per-tab lifecycle:
//!
//! ```text
//! Active ──close(can_undo)──► PendingClosure ──commit──► Destroyed
//!   ▲                              │
//!   └──────────cancel──────────────┘
//! Active ──close(!can_undo)──────────────────────────► Destroyed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::tab::{Tab, TabLaunchType};

use super::observer::TabModelObserver;

// ============================================================================
// Types
// ============================================================================

/// Closure state of a tab held by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureState {
    /// Visible and selectable.
    Active,
    /// Hidden, awaiting commit or undo.
    PendingClosure,
}

#[derive(Debug)]
struct Slot {
    tab: Tab,
    state: ClosureState,
}

impl Slot {
    #[inline]
    fn is_active(&self) -> bool {
        self.state == ClosureState::Active
    }
}

/// Mutable model contents, guarded by one lock.
#[derive(Debug, Default)]
struct ModelState {
    slots: Vec<Slot>,
    active: Option<TabId>,
}

/// Notification queued while the state lock is held.
enum ModelEvent {
    Added(Tab, TabLaunchType),
    Selected(Tab, TabId),
    WillClose(Tab, bool),
    DidClose(TabId, bool),
    Moved(Tab, usize, usize),
    PendingClosure(Tab),
    AllPendingClosure(Vec<TabId>),
    Undone(Tab),
    Committed(Tab),
}

/// IDs held by a group of models. The two models of a selector share one
/// set so an ID never appears in both.
pub(crate) type HeldIds = Arc<Mutex<FxHashSet<TabId>>>;

/// Internal shared state for a model.
pub(crate) struct TabModelInner {
    incognito: bool,
    held: HeldIds,
    supports_pending_closures: AtomicBool,
    state: Mutex<ModelState>,
    observers: RwLock<Vec<Arc<dyn TabModelObserver>>>,
}

// ============================================================================
// ModelState - Index Helpers
// ============================================================================

impl ModelState {
    fn visible_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_active()).count()
    }

    fn visible(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|slot| slot.is_active())
    }

    /// Physical position of the visible tab at `index`.
    fn physical_of(&self, index: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_active())
            .nth(index)
            .map(|(pos, _)| pos)
    }

    fn position_of(&self, id: TabId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.tab.id() == id)
    }

    fn visible_index_of(&self, id: TabId) -> Option<usize> {
        self.visible().position(|slot| slot.tab.id() == id)
    }

    fn visible_tab(&self, id: TabId) -> Option<&Tab> {
        self.visible()
            .find(|slot| slot.tab.id() == id)
            .map(|slot| &slot.tab)
    }

    /// Tab to select once `closing` leaves the visible sequence.
    ///
    /// Prefers the parent, then the previous tab, then the next one.
    fn next_selection(&self, closing: &Tab) -> Option<Tab> {
        if let Some(parent) = self.visible_tab(closing.parent_id())
            && parent.id() != closing.id()
        {
            return Some(parent.clone());
        }

        let index = self.visible_index_of(closing.id())?;
        let neighbour = if index > 0 { index - 1 } else { index + 1 };
        self.visible().nth(neighbour).map(|slot| slot.tab.clone())
    }
}

// ============================================================================
// TabModel
// ============================================================================

/// Ordered collection of tabs for one profile (regular or incognito).
///
/// The model is a cheap clone handle. All clones observe the same tabs.
///
/// # Example
///
/// ```ignore
/// let model = TabModel::new(false);
/// model.add_tab(tab.clone(), None, TabLaunchType::FromLink)?;
///
/// model.close_tab(&tab, false, false, true)?;
/// assert_eq!(model.count(), 0);
///
/// model.cancel_tab_closure(tab.id());
/// assert_eq!(model.count(), 1);
/// ```
#[derive(Clone)]
pub struct TabModel {
    pub(crate) inner: Arc<TabModelInner>,
}

impl fmt::Debug for TabModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TabModel")
            .field("incognito", &self.inner.incognito)
            .field("count", &state.visible_count())
            .field("pending", &(state.slots.len() - state.visible_count()))
            .field("active", &state.active)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TabModel - Constructor
// ============================================================================

impl TabModel {
    /// Creates an empty model with undoable closures enabled.
    #[must_use]
    pub fn new(incognito: bool) -> Self {
        Self::with_held_ids(incognito, HeldIds::default())
    }

    /// Creates an empty model that reserves IDs in `held`.
    pub(crate) fn with_held_ids(incognito: bool, held: HeldIds) -> Self {
        Self {
            inner: Arc::new(TabModelInner {
                incognito,
                held,
                supports_pending_closures: AtomicBool::new(true),
                state: Mutex::new(ModelState::default()),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Enables or disables undoable closures.
    ///
    /// When disabled, `can_undo` is ignored and closes are immediate.
    pub fn set_supports_pending_closures(&self, enabled: bool) {
        self.inner
            .supports_pending_closures
            .store(enabled, Ordering::Release);
    }

    /// Returns `true` if closures can be undone.
    #[must_use]
    pub fn supports_pending_closures(&self) -> bool {
        self.inner.supports_pending_closures.load(Ordering::Acquire)
    }
}

// ============================================================================
// TabModel - Observers
// ============================================================================

impl TabModel {
    /// Registers an observer.
    pub fn add_observer(&self, observer: Arc<dyn TabModelObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Unregisters an observer previously passed to [`add_observer`](Self::add_observer).
    pub fn remove_observer(&self, observer: &Arc<dyn TabModelObserver>) {
        self.inner
            .observers
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    fn dispatch(&self, events: Vec<ModelEvent>) {
        if events.is_empty() {
            return;
        }
        let observers = self.inner.observers.read().clone();
        for event in &events {
            for observer in &observers {
                match event {
                    ModelEvent::Added(tab, launch_type) => observer.did_add_tab(tab, *launch_type),
                    ModelEvent::Selected(tab, last_id) => observer.did_select_tab(tab, *last_id),
                    ModelEvent::WillClose(tab, animate) => observer.will_close_tab(tab, *animate),
                    ModelEvent::DidClose(id, incognito) => observer.did_close_tab(*id, *incognito),
                    ModelEvent::Moved(tab, new_index, old_index) => {
                        observer.did_move_tab(tab, *new_index, *old_index)
                    }
                    ModelEvent::PendingClosure(tab) => observer.tab_pending_closure(tab),
                    ModelEvent::AllPendingClosure(ids) => observer.all_tabs_pending_closure(ids),
                    ModelEvent::Undone(tab) => observer.tab_closure_undone(tab),
                    ModelEvent::Committed(tab) => observer.tab_closure_committed(tab),
                }
            }
        }
    }
}

// ============================================================================
// TabModel - Accessors
// ============================================================================

impl TabModel {
    /// Returns `true` for the incognito model.
    #[inline]
    #[must_use]
    pub fn is_incognito(&self) -> bool {
        self.inner.incognito
    }

    /// Returns the number of visible tabs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.state.lock().visible_count()
    }

    /// Returns `true` if no tab is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns the visible tab at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= count()`.
    pub fn get_tab_at(&self, index: usize) -> Result<Tab> {
        let state = self.inner.state.lock();
        state
            .visible()
            .nth(index)
            .map(|slot| slot.tab.clone())
            .ok_or_else(|| Error::index_out_of_range(index, state.visible_count()))
    }

    /// Finds a tab by ID, including tabs pending closure.
    #[must_use]
    pub fn tab_by_id(&self, id: TabId) -> Option<Tab> {
        let state = self.inner.state.lock();
        state
            .slots
            .iter()
            .find(|slot| slot.tab.id() == id)
            .map(|slot| slot.tab.clone())
    }

    /// Returns the visible index of a tab.
    #[must_use]
    pub fn index_of(&self, id: TabId) -> Option<usize> {
        self.inner.state.lock().visible_index_of(id)
    }

    /// Returns the visible tabs in order.
    #[must_use]
    pub fn tabs(&self) -> Vec<Tab> {
        self.inner
            .state
            .lock()
            .visible()
            .map(|slot| slot.tab.clone())
            .collect()
    }

    /// Returns the IDs of every tab held, pending closures included.
    #[must_use]
    pub fn all_tab_ids(&self) -> Vec<TabId> {
        self.inner
            .state
            .lock()
            .slots
            .iter()
            .map(|slot| slot.tab.id())
            .collect()
    }

    /// Returns the active tab ID, or [`TabId::INVALID`] when empty.
    #[must_use]
    pub fn current_tab_id(&self) -> TabId {
        self.inner.state.lock().active.unwrap_or(TabId::INVALID)
    }

    /// Returns the visible index of the active tab.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        let state = self.inner.state.lock();
        state.active.and_then(|id| state.visible_index_of(id))
    }

    /// Returns the active tab.
    #[must_use]
    pub fn current_tab(&self) -> Option<Tab> {
        let state = self.inner.state.lock();
        state
            .active
            .and_then(|id| state.visible_tab(id))
            .cloned()
    }

    /// Returns `true` if the tab is pending closure.
    #[must_use]
    pub fn is_pending_closure(&self, id: TabId) -> bool {
        self.inner
            .state
            .lock()
            .slots
            .iter()
            .any(|slot| slot.tab.id() == id && slot.state == ClosureState::PendingClosure)
    }

    /// Returns the IDs of tabs pending closure, in model order.
    #[must_use]
    pub fn pending_closure_ids(&self) -> Vec<TabId> {
        self.inner
            .state
            .lock()
            .slots
            .iter()
            .filter(|slot| !slot.is_active())
            .map(|slot| slot.tab.id())
            .collect()
    }
}

// ============================================================================
// TabModel - Structural Changes
// ============================================================================

impl TabModel {
    /// Inserts a tab at a visible `index`, or appends when `index` is `None`.
    ///
    /// The tab becomes active if the model had no active tab, or if it was
    /// opened in the foreground. Returns the visible index it landed at.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateTab`] if the ID is already held
    /// - [`Error::IndexOutOfRange`] if `index > count()`
    /// - [`Error::TabDestroyed`] if the tab was closed
    /// - [`Error::InvalidState`] if the tab belongs to the other profile
    pub fn add_tab(
        &self,
        tab: Tab,
        index: Option<usize>,
        launch_type: TabLaunchType,
    ) -> Result<usize> {
        if tab.is_destroyed() {
            return Err(Error::tab_destroyed(tab.id()));
        }
        if tab.is_incognito() != self.inner.incognito {
            return Err(Error::invalid_state(format!(
                "tab {} has incognito={} but model has incognito={}",
                tab.id(),
                tab.is_incognito(),
                self.inner.incognito
            )));
        }

        let mut events = Vec::new();
        let index = {
            let mut state = self.inner.state.lock();
            let count = state.visible_count();
            let index = index.unwrap_or(count);
            if index > count {
                return Err(Error::index_out_of_range(index, count));
            }
            if !self.inner.held.lock().insert(tab.id()) {
                return Err(Error::duplicate_tab(tab.id()));
            }

            let position = state.physical_of(index).unwrap_or(state.slots.len());
            state.slots.insert(
                position,
                Slot {
                    tab: tab.clone(),
                    state: ClosureState::Active,
                },
            );
            events.push(ModelEvent::Added(tab.clone(), launch_type));

            let background = matches!(
                launch_type,
                TabLaunchType::FromLongpress | TabLaunchType::FromRestore
            );
            if state.active.is_none() || !background {
                let last = state.active.replace(tab.id()).unwrap_or(TabId::INVALID);
                events.push(ModelEvent::Selected(tab.clone(), last));
            }
            index
        };

        trace!(tab_id = %tab.id(), index, incognito = self.inner.incognito, "Tab added");
        self.dispatch(events);
        Ok(index)
    }

    /// Selects the visible tab at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= count()`.
    pub fn set_index(&self, index: usize) -> Result<()> {
        let event = {
            let mut state = self.inner.state.lock();
            let tab = state
                .visible()
                .nth(index)
                .map(|slot| slot.tab.clone())
                .ok_or_else(|| Error::index_out_of_range(index, state.visible_count()))?;
            if state.active == Some(tab.id()) {
                None
            } else {
                let last = state.active.replace(tab.id()).unwrap_or(TabId::INVALID);
                Some(ModelEvent::Selected(tab, last))
            }
        };
        self.dispatch(event.into_iter().collect());
        Ok(())
    }

    /// Moves a visible tab to `new_index`.
    ///
    /// # Errors
    ///
    /// - [`Error::TabNotFound`] if the tab is not visible in this model
    /// - [`Error::IndexOutOfRange`] if `new_index >= count()`
    pub fn move_tab(&self, id: TabId, new_index: usize) -> Result<()> {
        let event = {
            let mut state = self.inner.state.lock();
            let old_index = state
                .visible_index_of(id)
                .ok_or_else(|| Error::tab_not_found(id))?;
            let count = state.visible_count();
            if new_index >= count {
                return Err(Error::index_out_of_range(new_index, count));
            }
            if old_index == new_index {
                return Ok(());
            }

            let from = state.position_of(id).ok_or_else(|| Error::tab_not_found(id))?;
            let slot = state.slots.remove(from);
            let tab = slot.tab.clone();
            let to = state.physical_of(new_index).unwrap_or(state.slots.len());
            state.slots.insert(to, slot);
            ModelEvent::Moved(tab, new_index, old_index)
        };
        debug!(tab_id = %id, new_index, "Tab moved");
        self.dispatch(vec![event]);
        Ok(())
    }
}

// ============================================================================
// TabModel - Closing
// ============================================================================

impl TabModel {
    /// Closes a visible tab.
    ///
    /// With `can_undo` (and pending closures supported, and not `upon_exit`)
    /// the tab moves to pending closure. Otherwise it is destroyed at once.
    /// Returns `false` if the tab is not visible in this model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TabDestroyed`] if the tab was already destroyed.
    pub fn close_tab(
        &self,
        tab: &Tab,
        animate: bool,
        upon_exit: bool,
        can_undo: bool,
    ) -> Result<bool> {
        if tab.is_destroyed() {
            return Err(Error::tab_destroyed(tab.id()));
        }
        let undoable = can_undo && !upon_exit && self.supports_pending_closures();

        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let Some(position) = state
                .position_of(tab.id())
                .filter(|&pos| state.slots[pos].is_active())
            else {
                return Ok(false);
            };

            events.push(ModelEvent::WillClose(tab.clone(), animate));

            if state.active == Some(tab.id()) {
                let next = state.next_selection(tab);
                state.active = next.as_ref().map(Tab::id);
                if let Some(next) = next {
                    events.push(ModelEvent::Selected(next, tab.id()));
                }
            }

            if undoable {
                state.slots[position].state = ClosureState::PendingClosure;
                events.push(ModelEvent::PendingClosure(tab.clone()));
            } else {
                let slot = state.slots.remove(position);
                self.release(slot.tab.id());
                slot.tab.destroy();
                events.push(ModelEvent::DidClose(tab.id(), self.inner.incognito));
            }
        }

        debug!(tab_id = %tab.id(), undoable, incognito = self.inner.incognito, "Tab closed");
        self.dispatch(events);
        Ok(true)
    }

    /// Closes the visible tab with `id`. See [`close_tab`](Self::close_tab).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TabNotFound`] if the ID is not visible in this model.
    pub fn close_tab_by_id(&self, id: TabId, can_undo: bool) -> Result<()> {
        let tab = self
            .inner
            .state
            .lock()
            .visible_tab(id)
            .cloned()
            .ok_or_else(|| Error::tab_not_found(id))?;
        self.close_tab(&tab, false, false, can_undo)?;
        Ok(())
    }

    /// Closes every visible tab in one batch.
    ///
    /// Observers first receive `all_tabs_pending_closure` with every ID, then
    /// one `tab_pending_closure` per tab. When closures cannot be undone
    /// (`upon_exit` or undo disabled) the tabs are destroyed instead.
    pub fn close_all_tabs(&self, from_menu: bool, upon_exit: bool) {
        let undoable = !upon_exit && self.supports_pending_closures();

        let mut events = Vec::new();
        let closed = {
            let mut state = self.inner.state.lock();
            let ids: Vec<TabId> = state.visible().map(|slot| slot.tab.id()).collect();
            if ids.is_empty() {
                return;
            }
            state.active = None;

            if undoable {
                events.push(ModelEvent::AllPendingClosure(ids.clone()));
                for slot in state.slots.iter_mut().filter(|slot| slot.is_active()) {
                    slot.state = ClosureState::PendingClosure;
                    events.push(ModelEvent::PendingClosure(slot.tab.clone()));
                }
            } else {
                let (closing, kept): (Vec<Slot>, Vec<Slot>) =
                    std::mem::take(&mut state.slots)
                        .into_iter()
                        .partition(Slot::is_active);
                state.slots = kept;
                for slot in closing {
                    self.release(slot.tab.id());
                    events.push(ModelEvent::WillClose(slot.tab.clone(), false));
                    slot.tab.destroy();
                    events.push(ModelEvent::DidClose(slot.tab.id(), self.inner.incognito));
                }
            }
            ids.len()
        };

        info!(
            count = closed,
            from_menu,
            undoable,
            incognito = self.inner.incognito,
            "All tabs closed"
        );
        self.dispatch(events);
    }

    /// Reverses a pending closure.
    ///
    /// The tab reappears between its original neighbours. It becomes active
    /// only if the model has no active tab. Returns `false` (no-op) if the
    /// tab is not pending closure.
    pub fn cancel_tab_closure(&self, id: TabId) -> bool {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let Some(position) = state
                .position_of(id)
                .filter(|&pos| !state.slots[pos].is_active())
            else {
                return false;
            };

            state.slots[position].state = ClosureState::Active;
            let tab = state.slots[position].tab.clone();
            events.push(ModelEvent::Undone(tab.clone()));

            if state.active.is_none() {
                state.active = Some(id);
                events.push(ModelEvent::Selected(tab, TabId::INVALID));
            }
        }

        debug!(tab_id = %id, incognito = self.inner.incognito, "Tab closure cancelled");
        self.dispatch(events);
        true
    }

    /// Makes a pending closure permanent and destroys the tab.
    ///
    /// Returns `false` if the tab is not pending closure.
    pub fn commit_tab_closure(&self, id: TabId) -> bool {
        let tab = {
            let mut state = self.inner.state.lock();
            let Some(position) = state
                .position_of(id)
                .filter(|&pos| !state.slots[pos].is_active())
            else {
                return false;
            };
            state.slots.remove(position).tab
        };

        self.release(id);
        tab.destroy();
        debug!(tab_id = %id, incognito = self.inner.incognito, "Tab closure committed");
        self.dispatch(vec![
            ModelEvent::DidClose(id, self.inner.incognito),
            ModelEvent::Committed(tab),
        ]);
        true
    }

    fn release(&self, id: TabId) {
        self.inner.held.lock().remove(&id);
    }

    /// Commits every pending closure.
    pub fn commit_all_tab_closures(&self) {
        for id in self.pending_closure_ids() {
            self.commit_tab_closure(id);
        }
    }

    /// Tears the model down.
    ///
    /// Pending closures are committed, then every remaining tab is destroyed
    /// without further notifications.
    pub fn destroy(&self) {
        self.commit_all_tab_closures();
        let slots = {
            let mut state = self.inner.state.lock();
            state.active = None;
            std::mem::take(&mut state.slots)
        };
        for slot in &slots {
            self.release(slot.tab.id());
            slot.tab.destroy();
        }
        info!(
            count = slots.len(),
            incognito = self.inner.incognito,
            "Tab model destroyed"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
