//! Tab persistent store.
//!
//! The [`TabPersistentStore`] keeps a [`TabModelSelector`] and its on-disk
//! state in sync. It reads the tab list at startup and restores the tabs
//! through the embedder's [`TabCreator`](crate::model::TabCreator)s. It then
//! observes both models and writes the list back whenever they change.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tab_persistence::{StateDirectory, TabCreatorManager, TabModelSelector, TabPersistentStore};
//!
//! # async fn example(
//! #     selector: TabModelSelector,
//! #     creators: Arc<dyn TabCreatorManager>,
//! # ) -> tab_persistence::Result<()> {
//! let store = TabPersistentStore::builder()
//!     .state_directory(StateDirectory::from_path("./tabs", 0)?)
//!     .selector(selector)
//!     .tab_creators(creators)
//!     .build()?;
//!
//! store.load_state().await?;
//! store.restore_tabs(true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Restore Lifecycle
//!
//! | Phase | Entered by | Allows |
//! |-------|------------|--------|
//! | [`RestorePhase::Idle`] | construction | `load_state` |
//! | [`RestorePhase::Loaded`] | `load_state` | `restore_tabs`, `restore_tab_state_for_id` |
//! | [`RestorePhase::Restoring`] | `restore_tabs` | `restore_tab_state_for_id` |
//! | [`RestorePhase::Restored`] | end of `restore_tabs` | saves only |
//!
//! Saves are accepted in every phase. Entries that have not been restored
//! yet are carried over into every metadata file written before they are.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::model::{TabCreatorManager, TabModelObserver, TabModelSelector};
use crate::tab::{Tab, TabLaunchType, TabState};

use super::builder::TabPersistentStoreBuilder;
use super::directory::StateDirectory;
use super::metadata::{METADATA_VERSION, TabListEntry, TabListMetadata};
use super::observer::TabPersistentStoreObserver;
use super::options::StoreOptions;
use super::writer::{SaveSignal, run_writer};

// ============================================================================
// Constants
// ============================================================================

/// URL of a regular tab recreated without state or a usable URL.
const FALLBACK_URL: &str = "about:blank";

// ============================================================================
// RestorePhase
// ============================================================================

/// Progress of the startup restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestorePhase {
    /// Nothing read yet.
    Idle,
    /// Metadata read in progress.
    Loading,
    /// Metadata read, no tab restored by `restore_tabs` yet.
    Loaded,
    /// `restore_tabs` is running.
    Restoring,
    /// `restore_tabs` finished.
    Restored,
}

impl RestorePhase {
    /// Returns `true` once the metadata has been read.
    #[inline]
    #[must_use]
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Loaded | Self::Restoring | Self::Restored)
    }
}

// ============================================================================
// Types
// ============================================================================

/// Metadata entry waiting to be restored.
struct PendingEntry {
    /// Position in the metadata file.
    position: usize,
    entry: TabListEntry,
    /// Taken by a restore that has not finished yet.
    claimed: bool,
    /// Being reopened from its URL under a new ID.
    reopening: bool,
}

/// Restore bookkeeping, guarded by one lock.
struct RestoreState {
    phase: RestorePhase,
    pending: Vec<PendingEntry>,
    active_regular: TabId,
    active_incognito: TabId,
    incognito_selected: bool,
    restore_incognito: bool,
    /// File position of every restored tab, keyed by its live ID.
    positions: FxHashMap<TabId, usize>,
    /// Reopened tabs an asynchronous creator has not added yet, with their
    /// file position.
    awaiting_add: FxHashMap<TabId, usize>,
    restored_active_regular: TabId,
    restored_active_incognito: TabId,
    tab_count_at_startup: usize,
}

impl Default for RestoreState {
    fn default() -> Self {
        Self {
            phase: RestorePhase::Idle,
            pending: Vec::new(),
            active_regular: TabId::INVALID,
            active_incognito: TabId::INVALID,
            incognito_selected: false,
            restore_incognito: true,
            positions: FxHashMap::default(),
            awaiting_add: FxHashMap::default(),
            restored_active_regular: TabId::INVALID,
            restored_active_incognito: TabId::INVALID,
            tab_count_at_startup: 0,
        }
    }
}

impl RestoreState {
    /// IDs of unclaimed entries in restore order.
    fn restore_order(&self, prioritize_active: bool) -> Vec<TabId> {
        let mut order: Vec<TabId> = self
            .pending
            .iter()
            .filter(|pending| !pending.claimed)
            .map(|pending| pending.entry.id)
            .collect();

        if prioritize_active {
            let first = if self.incognito_selected
                && self.restore_incognito
                && self.active_incognito.is_valid()
            {
                self.active_incognito
            } else {
                self.active_regular
            };
            if let Some(position) = order.iter().position(|&id| id == first) {
                let id = order.remove(position);
                order.insert(0, id);
            }
        }
        order
    }

    /// `id` if it is still awaiting restore, else [`TabId::INVALID`].
    fn saved_active_if_pending(&self, id: TabId) -> TabId {
        if self.pending.iter().any(|pending| pending.entry.id == id) {
            id
        } else {
            TabId::INVALID
        }
    }

    /// Appends the entries of one profile: live tabs in model order, with
    /// each unrestored entry placed before the first restored tab that
    /// followed it in the file.
    ///
    /// A claimed entry keeps its slot until its restore settles. Tabs reopened
    /// for such an entry are left out so the entry is listed exactly once.
    fn merge_entries(
        &self,
        incognito: bool,
        live: &[Tab],
        out: &mut Vec<TabListEntry>,
        listed: &mut FxHashSet<TabId>,
    ) {
        let mut waiting = self
            .pending
            .iter()
            .filter(|pending| pending.entry.incognito == incognito)
            .peekable();
        let mut reopening = self
            .pending
            .iter()
            .filter(|pending| pending.entry.incognito == incognito && pending.reopening)
            .count();

        for tab in live {
            let position = self.positions.get(&tab.id()).copied();
            if position.is_none()
                && reopening > 0
                && tab.launch_type() == TabLaunchType::FromRestore
            {
                reopening -= 1;
                continue;
            }
            if let Some(position) = position {
                while let Some(pending) = waiting.next_if(|pending| pending.position < position) {
                    if listed.insert(pending.entry.id) {
                        out.push(pending.entry.clone());
                    }
                }
            }
            if listed.insert(tab.id()) {
                out.push(TabListEntry::new(tab.id(), tab.url(), incognito));
            }
        }
        for pending in waiting {
            if listed.insert(pending.entry.id) {
                out.push(pending.entry.clone());
            }
        }
    }
}

/// Internal shared state for the store.
pub(crate) struct StoreInner {
    pub directory: StateDirectory,
    pub options: StoreOptions,
    pub selector: TabModelSelector,
    pub creators: Arc<dyn TabCreatorManager>,
    pub observer: Arc<dyn TabPersistentStoreObserver>,
    pub runtime: Handle,
    restore: Mutex<RestoreState>,
    /// Tabs whose state blob must be written by the next save.
    save_queue: Mutex<Vec<Tab>>,
    signal: Arc<SaveSignal>,
    /// Serializes file writes of the writer task and `save_state`.
    write_lock: Mutex<()>,
    /// Adapter registered on both models.
    model_observer: Mutex<Option<Arc<dyn TabModelObserver>>>,
}

// ============================================================================
// TabPersistentStore
// ============================================================================

/// Saves and restores the tabs of one [`TabModelSelector`].
///
/// Cloning returns another handle to the same store. The background writer
/// stops on [`shutdown`](Self::shutdown) or when the last handle is dropped.
#[derive(Clone)]
pub struct TabPersistentStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl fmt::Debug for TabPersistentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabPersistentStore")
            .field("path", &self.inner.directory.path())
            .field("phase", &self.phase())
            .field("pending_restore", &self.pending_restore_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TabPersistentStore - Constructors
// ============================================================================

impl TabPersistentStore {
    /// Creates a configuration builder for the store.
    #[inline]
    #[must_use]
    pub fn builder() -> TabPersistentStoreBuilder {
        TabPersistentStoreBuilder::new()
    }

    /// Wires the store to the models and starts the writer task.
    pub(crate) fn start(
        directory: StateDirectory,
        options: StoreOptions,
        selector: TabModelSelector,
        creators: Arc<dyn TabCreatorManager>,
        observer: Arc<dyn TabPersistentStoreObserver>,
        runtime: Handle,
    ) -> Self {
        let signal = Arc::new(SaveSignal::new());
        let save_delay = options.save_delay;

        let inner = Arc::new(StoreInner {
            directory,
            options,
            selector,
            creators,
            observer,
            runtime,
            restore: Mutex::new(RestoreState::default()),
            save_queue: Mutex::new(Vec::new()),
            signal: Arc::clone(&signal),
            write_lock: Mutex::new(()),
            model_observer: Mutex::new(None),
        });

        let adapter: Arc<dyn TabModelObserver> = Arc::new(ModelChangeObserver {
            store: Arc::downgrade(&inner),
        });
        inner.selector.model(false).add_observer(Arc::clone(&adapter));
        inner.selector.model(true).add_observer(Arc::clone(&adapter));
        *inner.model_observer.lock() = Some(adapter);

        inner
            .runtime
            .spawn(run_writer(Arc::downgrade(&inner), signal, save_delay));

        info!(
            path = %inner.directory.path().display(),
            selector_index = inner.options.selector_index,
            "Tab persistent store started"
        );
        Self { inner }
    }
}

// ============================================================================
// TabPersistentStore - Accessors
// ============================================================================

impl TabPersistentStore {
    /// Returns the state directory.
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &StateDirectory {
        &self.inner.directory
    }

    /// Returns the options the store was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Returns the observed selector.
    #[inline]
    #[must_use]
    pub fn selector(&self) -> &TabModelSelector {
        &self.inner.selector
    }

    /// Returns the restore phase.
    #[must_use]
    pub fn phase(&self) -> RestorePhase {
        self.inner.restore.lock().phase
    }

    /// Returns the number of entries in the metadata read at startup.
    #[must_use]
    pub fn tab_count_at_startup(&self) -> usize {
        self.inner.restore.lock().tab_count_at_startup
    }

    /// Returns the number of entries not restored yet.
    #[must_use]
    pub fn pending_restore_count(&self) -> usize {
        self.inner.restore.lock().pending.len()
    }

    /// Returns `true` if the writer has been stopped.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.signal.is_shutdown()
    }
}

// ============================================================================
// TabPersistentStore - Restore
// ============================================================================

impl TabPersistentStore {
    /// Reads the metadata file and reports every entry.
    ///
    /// Fires [`on_details_read`](TabPersistentStoreObserver::on_details_read)
    /// per entry in file order, then
    /// [`on_initialized`](TabPersistentStoreObserver::on_initialized). A
    /// missing or corrupt file reads as an empty list. Bumps the selector's
    /// ID allocator past every listed ID.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if called more than once
    /// - [`Error::TaskJoin`] if the read task panicked
    pub async fn load_state(&self) -> Result<()> {
        {
            let mut restore = self.inner.restore.lock();
            if restore.phase != RestorePhase::Idle {
                return Err(Error::invalid_state(format!(
                    "load_state called in phase {:?}",
                    restore.phase
                )));
            }
            restore.phase = RestorePhase::Loading;
        }

        let path = self.inner.directory.metadata_path();
        let read = tokio::task::spawn_blocking(move || TabListMetadata::read_from(&path)).await;
        let metadata = match read {
            Ok(Ok(Some(metadata))) => metadata,
            Ok(Ok(None)) => {
                debug!("No tab list metadata found");
                TabListMetadata::default()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Tab list metadata unreadable, restoring no tabs");
                TabListMetadata::default()
            }
            Err(e) => {
                self.inner.restore.lock().phase = RestorePhase::Idle;
                return Err(e.into());
            }
        };

        if let Some(max_id) = metadata.max_id() {
            self.inner
                .selector
                .ids()
                .increment_to(max_id.as_i32().saturating_add(1));
        }

        {
            let mut restore = self.inner.restore.lock();
            restore.active_regular = metadata.active_regular;
            restore.active_incognito = metadata.active_incognito;
            restore.incognito_selected = metadata.incognito_selected;
            restore.tab_count_at_startup = metadata.len();
            restore.pending = metadata
                .tabs
                .iter()
                .enumerate()
                .map(|(position, entry)| PendingEntry {
                    position,
                    entry: entry.clone(),
                    claimed: false,
                    reopening: false,
                })
                .collect();
            restore.phase = RestorePhase::Loaded;
        }

        for (index, entry) in metadata.tabs.iter().enumerate() {
            self.inner.observer.on_details_read(
                index,
                entry.id,
                &entry.url,
                !entry.incognito && entry.id == metadata.active_regular,
                entry.incognito && entry.id == metadata.active_incognito,
            );
        }
        self.inner.observer.on_initialized(metadata.len());

        info!(
            count = metadata.len(),
            incognito = metadata.incognito_count(),
            version = metadata.version,
            "Tab list loaded"
        );
        Ok(())
    }

    /// Restores every entry read by [`load_state`](Self::load_state).
    ///
    /// The active tab goes first when
    /// [`prioritize_active_tab`](StoreOptions::prioritize_active_tab) is set.
    /// Every tab still lands at the position matching its file order. Regular
    /// tabs without state are reopened from their URL. Incognito tabs without
    /// state are dropped. With `restore_incognito` false, incognito entries
    /// are dropped and their state deleted.
    ///
    /// Fires [`on_state_loaded`](TabPersistentStoreObserver::on_state_loaded)
    /// when done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the store is in
    /// [`RestorePhase::Loaded`].
    pub async fn restore_tabs(&self, restore_incognito: bool) -> Result<()> {
        let order = {
            let mut restore = self.inner.restore.lock();
            if restore.phase != RestorePhase::Loaded {
                return Err(Error::invalid_state(format!(
                    "restore_tabs called in phase {:?}",
                    restore.phase
                )));
            }
            restore.phase = RestorePhase::Restoring;
            restore.restore_incognito = restore_incognito;
            restore.restore_order(self.inner.options.prioritize_active_tab)
        };

        debug!(count = order.len(), restore_incognito, "Restoring tabs");

        let mut restored = 0usize;
        for id in order {
            if self.inner.restore_entry(id).await {
                restored += 1;
            }
        }

        self.inner.finish_restore();

        if self.inner.options.clean_up_orphans
            && let Err(e) = self.clean_up_orphaned_state().await
        {
            warn!(error = %e, "Orphaned tab state cleanup failed");
        }

        info!(
            restored,
            regular = self.inner.selector.model(false).count(),
            incognito = self.inner.selector.model(true).count(),
            "Tabs restored"
        );
        self.inner.observer.on_state_loaded();
        Ok(())
    }

    /// Restores one pending entry ahead of the bulk restore.
    ///
    /// Returns `false` if `id` is not pending or the entry was dropped. A
    /// restored entry is skipped by [`restore_tabs`](Self::restore_tabs).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before [`load_state`](Self::load_state)
    /// has finished.
    pub async fn restore_tab_state_for_id(&self, id: TabId) -> Result<bool> {
        let phase = self.phase();
        if !phase.is_loaded() {
            return Err(Error::invalid_state(format!(
                "restore_tab_state_for_id called in phase {:?}",
                phase
            )));
        }
        Ok(self.inner.restore_entry(id).await)
    }

    /// Restores the first pending entry whose URL equals `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before [`load_state`](Self::load_state)
    /// has finished.
    pub async fn restore_tab_state_for_url(&self, url: &str) -> Result<bool> {
        let id = {
            let restore = self.inner.restore.lock();
            if !restore.phase.is_loaded() {
                return Err(Error::invalid_state(format!(
                    "restore_tab_state_for_url called in phase {:?}",
                    restore.phase
                )));
            }
            restore
                .pending
                .iter()
                .find(|pending| !pending.claimed && pending.entry.url == url)
                .map(|pending| pending.entry.id)
        };
        match id {
            Some(id) => Ok(self.inner.restore_entry(id).await),
            None => Ok(false),
        }
    }
}

// ============================================================================
// TabPersistentStore - Saving
// ============================================================================

impl TabPersistentStore {
    /// Writes every dirty tab and the metadata file on the calling thread.
    ///
    /// Pending-closure tabs keep their state blobs but are left out of the
    /// metadata. Unrestored entries are kept. Does not fire
    /// [`on_metadata_saved_asynchronously`](TabPersistentStoreObserver::on_metadata_saved_asynchronously).
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata file cannot be written.
    pub fn save_state(&self) -> Result<()> {
        let mut tabs = std::mem::take(&mut *self.inner.save_queue.lock());
        let mut queued: FxHashSet<TabId> = tabs.iter().map(Tab::id).collect();
        for incognito in [false, true] {
            let model = self.inner.selector.model(incognito);
            for id in model.all_tab_ids() {
                if let Some(tab) = model.tab_by_id(id)
                    && tab.needs_save()
                    && queued.insert(id)
                {
                    tabs.push(tab);
                }
            }
        }

        let metadata = self.inner.snapshot();
        self.inner.write_files(&tabs, Some(&metadata))?;

        info!(tabs = tabs.len(), listed = metadata.len(), "Tab state saved");
        Ok(())
    }

    /// Requests an asynchronous metadata write.
    ///
    /// Requests made before the writer starts its next write are coalesced.
    pub fn save_tab_list_asynchronously(&self) {
        self.inner.request_save();
    }

    /// Queues the state blob of `tab` for the next asynchronous save.
    pub fn add_tab_to_save_queue(&self, tab: &Tab) {
        self.inner.queue_tab(tab.clone());
        if !self.inner.signal.is_shutdown() {
            self.inner.signal.wake();
        }
    }

    /// Drops `tab` from the save queue.
    pub fn remove_tab_from_queues(&self, tab: &Tab) {
        self.inner.remove_from_queue(tab.id());
    }
}

// ============================================================================
// TabPersistentStore - Maintenance
// ============================================================================

impl TabPersistentStore {
    /// Deletes state blobs that belong to no live, pending-closure or
    /// unrestored tab. Returns the number of files removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be listed.
    pub async fn clean_up_orphaned_state(&self) -> Result<usize> {
        let mut live: FxHashSet<(TabId, bool)> = FxHashSet::default();
        for incognito in [false, true] {
            for id in self.inner.selector.model(incognito).all_tab_ids() {
                live.insert((id, incognito));
            }
        }
        {
            let restore = self.inner.restore.lock();
            for pending in &restore.pending {
                live.insert((pending.entry.id, pending.entry.incognito));
            }
        }

        let inner = Arc::clone(&self.inner);
        let removed = tokio::task::spawn_blocking(move || -> Result<usize> {
            let _guard = inner.write_lock.lock();
            let mut removed = 0;
            for (id, incognito) in inner.directory.list_tab_state_files()? {
                if !live.contains(&(id, incognito)) && inner.directory.delete_tab_state(id, incognito) {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await??;

        if removed > 0 {
            info!(removed, "Orphaned tab state deleted");
        }
        Ok(removed)
    }

    /// Deletes the metadata file and every state blob, and forgets unrestored
    /// entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be cleared.
    pub fn clear_state(&self) -> Result<()> {
        self.inner.save_queue.lock().clear();
        self.inner.restore.lock().pending.clear();

        let _guard = self.inner.write_lock.lock();
        self.inner.directory.clear()?;
        info!(path = %self.inner.directory.path().display(), "Tab state cleared");
        Ok(())
    }

    /// Stops the writer and detaches from the models.
    ///
    /// A write already in progress completes. Later requests are ignored.
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        if self.inner.signal.is_shutdown() {
            return;
        }
        self.inner.detach();
        info!("Tab persistent store shut down");
    }
}

// ============================================================================
// StoreInner - Restore
// ============================================================================

impl StoreInner {
    /// Restores one entry. Returns `true` if a tab was created.
    async fn restore_entry(&self, id: TabId) -> bool {
        let (entry, position, restore_incognito) = {
            let mut restore = self.restore.lock();
            let restore_incognito = restore.restore_incognito;
            let claimed = match restore
                .pending
                .iter_mut()
                .find(|pending| pending.entry.id == id && !pending.claimed)
            {
                Some(pending) => {
                    pending.claimed = true;
                    (pending.entry.clone(), pending.position, restore_incognito)
                }
                None => return false,
            };
            // Frozen tabs keep their ID, so a save taken while the creator
            // runs already lists them in file order.
            restore.positions.insert(id, claimed.1);
            claimed
        };

        let created = self.materialize(&entry, position, restore_incognito).await;

        let mut restore = self.restore.lock();
        restore.pending.retain(|pending| pending.entry.id != id);
        let Some(tab) = created else {
            restore.positions.remove(&id);
            return false;
        };
        if tab.id() != id {
            restore.positions.remove(&id);
        }
        restore.positions.insert(tab.id(), position);
        if entry.incognito && entry.id == restore.active_incognito {
            restore.restored_active_incognito = tab.id();
        } else if !entry.incognito && entry.id == restore.active_regular {
            restore.restored_active_regular = tab.id();
        }
        true
    }

    /// Creates the tab for `entry`, or drops it.
    async fn materialize(
        &self,
        entry: &TabListEntry,
        position: usize,
        restore_incognito: bool,
    ) -> Option<Tab> {
        if entry.incognito && !restore_incognito {
            debug!(tab_id = %entry.id, "Dropping incognito tab");
            self.delete_tab_state_in_background(entry.id, true);
            return None;
        }

        let path = self.directory.tab_state_path(entry.id, entry.incognito);
        let state = match tokio::task::spawn_blocking(move || TabState::restore_from(&path)).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                warn!(tab_id = %entry.id, error = %e, "Tab state unreadable");
                None
            }
            Err(e) => {
                warn!(tab_id = %entry.id, error = %e, "Tab state read task failed");
                None
            }
        };
        let state = state.filter(|state| {
            if state.incognito != entry.incognito {
                warn!(tab_id = %entry.id, "Tab state profile does not match the tab list");
                return false;
            }
            true
        });

        let index = self.restore_index(entry.incognito, position, TabId::INVALID);
        let creator = self.creators.tab_creator(entry.incognito);

        let result = match state {
            Some(state) => creator.create_frozen_tab(state, entry.id, index),
            None if entry.incognito => {
                debug!(tab_id = %entry.id, "Dropping incognito tab without state");
                return None;
            }
            None => {
                let url = if entry.url.is_empty() {
                    FALLBACK_URL
                } else {
                    entry.url.as_str()
                };
                debug!(tab_id = %entry.id, url, "Reopening tab without state");
                self.mark_reopening(entry.id);
                creator
                    .create_new_tab(url, TabLaunchType::FromRestore, None)
                    .map(|tab| {
                        if creator.creates_tabs_asynchronously() {
                            self.await_restored_tab(&tab, position);
                        } else {
                            self.place_restored_tab(&tab, index);
                        }
                        tab
                    })
            }
        };

        match result {
            Ok(tab) => {
                trace!(tab_id = %tab.id(), index, "Tab restored");
                Some(tab)
            }
            Err(e) => {
                warn!(tab_id = %entry.id, error = %e, "Tab creation failed during restore");
                None
            }
        }
    }

    fn mark_reopening(&self, id: TabId) {
        let mut restore = self.restore.lock();
        if let Some(pending) = restore.pending.iter_mut().find(|pending| pending.entry.id == id) {
            pending.reopening = true;
        }
    }

    /// Visible index for the entry at file `position`: right after the last
    /// restored tab that precedes it in the file. `exclude` is left out of
    /// the count.
    fn restore_index(&self, incognito: bool, position: usize, exclude: TabId) -> usize {
        let tabs = self.selector.model(incognito).tabs();
        let restore = self.restore.lock();
        tabs.iter()
            .filter(|tab| tab.id() != exclude)
            .enumerate()
            .filter(|(_, tab)| {
                restore
                    .positions
                    .get(&tab.id())
                    .is_some_and(|&restored| restored < position)
            })
            .map(|(index, _)| index + 1)
            .last()
            .unwrap_or(0)
    }

    /// Defers placement of a reopened tab until its creator adds it.
    fn await_restored_tab(&self, tab: &Tab, position: usize) {
        self.restore.lock().awaiting_add.insert(tab.id(), position);
        if self.selector.model(tab.is_incognito()).index_of(tab.id()).is_some() {
            self.place_awaited_tab(tab);
        } else {
            debug!(tab_id = %tab.id(), "Waiting for asynchronously created tab");
        }
    }

    /// Places `tab` if it was reopened by an asynchronous creator.
    fn place_awaited_tab(&self, tab: &Tab) {
        let Some(position) = self.restore.lock().awaiting_add.remove(&tab.id()) else {
            return;
        };
        let index = self.restore_index(tab.is_incognito(), position, tab.id());
        self.place_restored_tab(tab, index);
    }

    /// Moves a tab opened through `create_new_tab` to its restore index.
    fn place_restored_tab(&self, tab: &Tab, index: usize) {
        let model = self.selector.model(tab.is_incognito());
        if let Some(current) = model.index_of(tab.id())
            && current != index
            && index < model.count()
            && let Err(e) = model.move_tab(tab.id(), index)
        {
            debug!(tab_id = %tab.id(), error = %e, "Could not move reopened tab");
        }
    }

    /// Selects the restored active tabs and the saved model.
    fn finish_restore(&self) {
        let (active_regular, active_incognito, incognito_selected, restore_incognito) = {
            let mut restore = self.restore.lock();
            restore.phase = RestorePhase::Restored;
            (
                restore.restored_active_regular,
                restore.restored_active_incognito,
                restore.incognito_selected,
                restore.restore_incognito,
            )
        };

        for (incognito, id) in [(false, active_regular), (true, active_incognito)] {
            if !id.is_valid() {
                continue;
            }
            let model = self.selector.model(incognito);
            if let Some(index) = model.index_of(id)
                && let Err(e) = model.set_index(index)
            {
                debug!(tab_id = %id, error = %e, "Could not select restored tab");
            }
        }

        if incognito_selected && restore_incognito && !self.selector.model(true).is_empty() {
            self.selector.select_model(true);
        }
    }
}

// ============================================================================
// StoreInner - Saving
// ============================================================================

impl StoreInner {
    /// Builds the metadata describing the current models.
    ///
    /// Incognito tabs come first. Unrestored entries are merged back at
    /// their file position relative to the restored tabs.
    fn snapshot(&self) -> TabListMetadata {
        let regular = self.selector.model(false);
        let incognito = self.selector.model(true);
        let incognito_tabs = incognito.tabs();
        let regular_tabs = regular.tabs();
        let mut active_regular = regular.current_tab_id();
        let mut active_incognito = incognito.current_tab_id();

        let restore = self.restore.lock();
        let mut listed = FxHashSet::default();
        let mut tabs =
            Vec::with_capacity(incognito_tabs.len() + regular_tabs.len() + restore.pending.len());
        restore.merge_entries(true, &incognito_tabs, &mut tabs, &mut listed);
        restore.merge_entries(false, &regular_tabs, &mut tabs, &mut listed);

        if !listed.contains(&active_regular) {
            active_regular = restore.saved_active_if_pending(restore.active_regular);
        }
        if !listed.contains(&active_incognito) {
            active_incognito = restore.saved_active_if_pending(restore.active_incognito);
        }
        let incognito_selected = self.selector.is_incognito_selected()
            || (restore.phase != RestorePhase::Restored && restore.incognito_selected);

        TabListMetadata {
            version: METADATA_VERSION,
            active_regular,
            active_incognito,
            incognito_selected,
            tabs,
        }
    }

    pub(crate) fn queue_tab(&self, tab: Tab) {
        let mut queue = self.save_queue.lock();
        if !queue.iter().any(|queued| queued.id() == tab.id()) {
            trace!(tab_id = %tab.id(), "Tab queued for save");
            queue.push(tab);
        }
    }

    pub(crate) fn remove_from_queue(&self, id: TabId) {
        self.save_queue.lock().retain(|queued| queued.id() != id);
    }

    /// Writes queued blobs and, if requested, the metadata.
    ///
    /// Blob failures are logged and leave the tab dirty. Only a metadata
    /// failure is returned.
    fn write_files(&self, tabs: &[Tab], metadata: Option<&TabListMetadata>) -> Result<()> {
        let _guard = self.write_lock.lock();
        for tab in tabs {
            if let Err(e) = self.write_tab_state(tab) {
                warn!(tab_id = %tab.id(), error = %e, "Failed to write tab state");
            }
        }
        if let Some(metadata) = metadata {
            metadata.write_to(&self.directory.metadata_path())?;
        }
        Ok(())
    }

    fn write_tab_state(&self, tab: &Tab) -> Result<()> {
        if tab.is_destroyed() {
            return Ok(());
        }
        tab.mark_saved();
        let Some(state) = tab.state() else {
            return Ok(());
        };
        let path = self.directory.tab_state_path(tab.id(), tab.is_incognito());
        state.save_to(&path).inspect_err(|_| tab.mark_needs_save())
    }

    /// One wake-up of the writer task.
    pub(crate) async fn run_pending_save(self: Arc<Self>) {
        let tabs = std::mem::take(&mut *self.save_queue.lock());
        let metadata_dirty = self.signal.take_metadata_dirty();
        if tabs.is_empty() && !metadata_dirty {
            return;
        }

        let metadata = metadata_dirty.then(|| self.snapshot());
        let store = Arc::clone(&self);
        let result =
            tokio::task::spawn_blocking(move || store.write_files(&tabs, metadata.as_ref())).await;

        match result {
            Ok(Ok(())) if metadata_dirty => {
                debug!("Tab list saved asynchronously");
                self.observer.on_metadata_saved_asynchronously();
            }
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Asynchronous tab list save failed"),
            Err(e) => warn!(error = %e, "Asynchronous save task failed"),
        }
    }

    fn request_save(&self) {
        if !self.signal.is_shutdown() {
            self.signal.request_metadata();
        }
    }

    fn delete_tab_state_in_background(&self, id: TabId, incognito: bool) {
        let path = self.directory.tab_state_path(id, incognito);
        self.runtime.spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => trace!(tab_id = %id, "Tab state deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete tab state"),
        });
    }

    /// Stops the writer and unregisters the model observer.
    fn detach(&self) {
        self.signal.shutdown();
        if let Some(adapter) = self.model_observer.lock().take() {
            self.selector.model(false).remove_observer(&adapter);
            self.selector.model(true).remove_observer(&adapter);
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.detach();
    }
}

// ============================================================================
// ModelChangeObserver
// ============================================================================

/// Turns model mutations into saves. Holds the store weakly so the models
/// do not keep it alive.
struct ModelChangeObserver {
    store: Weak<StoreInner>,
}

impl TabModelObserver for ModelChangeObserver {
    fn did_add_tab(&self, tab: &Tab, _launch_type: TabLaunchType) {
        if let Some(store) = self.store.upgrade() {
            store.place_awaited_tab(tab);
            if tab.needs_save() {
                store.queue_tab(tab.clone());
            }
            store.request_save();
        }
    }

    fn did_select_tab(&self, _tab: &Tab, _last_id: TabId) {
        if let Some(store) = self.store.upgrade() {
            store.request_save();
        }
    }

    fn did_close_tab(&self, tab_id: TabId, incognito: bool) {
        if let Some(store) = self.store.upgrade() {
            store.remove_from_queue(tab_id);
            store.delete_tab_state_in_background(tab_id, incognito);
            store.request_save();
        }
    }

    fn did_move_tab(&self, _tab: &Tab, _new_index: usize, _old_index: usize) {
        if let Some(store) = self.store.upgrade() {
            store.request_save();
        }
    }

    fn tab_pending_closure(&self, tab: &Tab) {
        if let Some(store) = self.store.upgrade() {
            if tab.needs_save() {
                store.queue_tab(tab.clone());
            }
            store.request_save();
        }
    }

    fn all_tabs_pending_closure(&self, _tab_ids: &[TabId]) {
        if let Some(store) = self.store.upgrade() {
            store.request_save();
        }
    }

    fn tab_closure_undone(&self, _tab: &Tab) {
        if let Some(store) = self.store.upgrade() {
            store.request_save();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
