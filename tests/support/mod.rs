//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use parking_lot::Mutex;
use tab_persistence::{
    Result, StateDirectory, StoreOptions, Tab, TabCreator, TabCreatorManager, TabId,
    TabIdAllocator, TabLaunchType, TabListEntry, TabListMetadata, TabModelSelector,
    TabPersistentStore, TabPersistentStoreObserver, TabState,
};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep, timeout};

/// Upper bound for any wait in the tests.
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Logging
// ============================================================================

/// Routes crate logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tab_persistence=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// CallbackHelper
// ============================================================================

/// Counts callback invocations and lets a test await the n-th one.
#[derive(Debug, Default)]
pub struct CallbackHelper {
    count: AtomicUsize,
    notify: Notify,
}

impl CallbackHelper {
    pub fn notify_called(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Waits until the callback has fired at least `target` times.
    pub async fn wait_for_count(&self, target: usize) -> anyhow::Result<()> {
        let reached = timeout(WAIT, async {
            loop {
                let notified = self.notify.notified();
                if self.call_count() >= target {
                    return;
                }
                notified.await;
            }
        })
        .await;

        if reached.is_err() {
            bail!(
                "timed out waiting for callback #{}, saw {}",
                target,
                self.call_count()
            );
        }
        Ok(())
    }
}

/// Polls `condition` until it holds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        if Instant::now() >= deadline {
            bail!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

// ============================================================================
// Mock Creators
// ============================================================================

/// Called by the mock creators right after a tab joins its model.
pub type AfterAdd = Arc<dyn Fn(TabId) + Send + Sync>;

/// Tabs returned by an asynchronous creator but not yet added.
type Deferred = Arc<Mutex<Vec<(Tab, TabLaunchType)>>>;

/// Creator that adds tabs to the selector's model.
///
/// An asynchronous creator holds new tabs back until
/// [`MockTabCreatorManager::add_deferred_tabs`]. Frozen tabs are always
/// added right away.
pub struct MockTabCreator {
    selector: TabModelSelector,
    incognito: bool,
    created: Arc<Mutex<Vec<TabId>>>,
    after_add: Option<AfterAdd>,
    deferred: Option<Deferred>,
}

impl MockTabCreator {
    fn record(&self, id: TabId) {
        self.created.lock().push(id);
        if let Some(after_add) = &self.after_add {
            after_add(id);
        }
    }
}

impl TabCreator for MockTabCreator {
    fn creates_tabs_asynchronously(&self) -> bool {
        self.deferred.is_some()
    }

    fn create_new_tab(
        &self,
        url: &str,
        launch_type: TabLaunchType,
        parent: Option<&Tab>,
    ) -> Result<Tab> {
        let id = self.selector.next_tab_id();
        let parent_id = parent.map_or(TabId::INVALID, Tab::id);
        let tab = Tab::new(id, self.incognito, parent_id, launch_type, url)?;
        if let Some(deferred) = &self.deferred {
            deferred.lock().push((tab.clone(), launch_type));
            self.created.lock().push(id);
            return Ok(tab);
        }
        self.selector
            .model(self.incognito)
            .add_tab(tab.clone(), None, launch_type)?;
        self.record(id);
        Ok(tab)
    }

    fn create_frozen_tab(&self, state: TabState, id: TabId, index: usize) -> Result<Tab> {
        let tab = Tab::frozen_from_state(id, state);
        self.selector
            .model(self.incognito)
            .add_tab(tab.clone(), Some(index), TabLaunchType::FromRestore)?;
        self.record(id);
        Ok(tab)
    }
}

/// Regular and incognito mock creators sharing one creation log.
pub struct MockTabCreatorManager {
    regular: Arc<MockTabCreator>,
    incognito: Arc<MockTabCreator>,
    created: Arc<Mutex<Vec<TabId>>>,
    selector: TabModelSelector,
    deferred: Option<Deferred>,
}

impl MockTabCreatorManager {
    pub fn new(selector: &TabModelSelector) -> Self {
        Self::build(selector, None, None)
    }

    /// Creators that run `after_add` for every tab they create.
    pub fn with_after_add(selector: &TabModelSelector, after_add: AfterAdd) -> Self {
        Self::build(selector, Some(after_add), None)
    }

    /// Creators that add new tabs only on [`add_deferred_tabs`](Self::add_deferred_tabs).
    pub fn asynchronous(selector: &TabModelSelector) -> Self {
        Self::build(selector, None, Some(Deferred::default()))
    }

    fn build(
        selector: &TabModelSelector,
        after_add: Option<AfterAdd>,
        deferred: Option<Deferred>,
    ) -> Self {
        let created = Arc::new(Mutex::new(Vec::new()));
        let creator = |incognito| {
            Arc::new(MockTabCreator {
                selector: selector.clone(),
                incognito,
                created: Arc::clone(&created),
                after_add: after_add.clone(),
                deferred: deferred.clone(),
            })
        };
        Self {
            regular: creator(false),
            incognito: creator(true),
            created: Arc::clone(&created),
            selector: selector.clone(),
            deferred,
        }
    }

    /// Adds every tab held back by an asynchronous creator.
    pub fn add_deferred_tabs(&self) -> Result<usize> {
        let tabs = self
            .deferred
            .as_ref()
            .map(|deferred| std::mem::take(&mut *deferred.lock()))
            .unwrap_or_default();
        for (tab, launch_type) in &tabs {
            self.selector
                .model(tab.is_incognito())
                .add_tab(tab.clone(), None, *launch_type)?;
        }
        Ok(tabs.len())
    }

    /// IDs of every tab created, in creation order.
    pub fn created(&self) -> Vec<TabId> {
        self.created.lock().clone()
    }

    pub fn first_created(&self) -> Option<TabId> {
        self.created.lock().first().copied()
    }
}

impl TabCreatorManager for MockTabCreatorManager {
    fn tab_creator(&self, incognito: bool) -> Arc<dyn TabCreator> {
        if incognito {
            self.incognito.clone()
        } else {
            self.regular.clone()
        }
    }
}

// ============================================================================
// Recording Observer
// ============================================================================

/// One `on_details_read` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailsRead {
    pub index: usize,
    pub id: TabId,
    pub url: String,
    pub is_standard_active: bool,
    pub is_incognito_active: bool,
}

/// Store observer that records every notification.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<&'static str>>,
    pub details: Mutex<Vec<DetailsRead>>,
    pub initialized_count: Mutex<Option<usize>>,
    pub state_loaded: CallbackHelper,
    pub metadata_saved: CallbackHelper,
}

impl RecordingObserver {
    pub fn detail_ids(&self) -> Vec<i32> {
        self.details.lock().iter().map(|d| d.id.as_i32()).collect()
    }
}

impl TabPersistentStoreObserver for RecordingObserver {
    fn on_initialized(&self, tab_count_at_startup: usize) {
        self.events.lock().push("initialized");
        *self.initialized_count.lock() = Some(tab_count_at_startup);
    }

    fn on_details_read(
        &self,
        index: usize,
        id: TabId,
        url: &str,
        is_standard_active_index: bool,
        is_incognito_active_index: bool,
    ) {
        self.events.lock().push("details_read");
        self.details.lock().push(DetailsRead {
            index,
            id,
            url: url.to_string(),
            is_standard_active: is_standard_active_index,
            is_incognito_active: is_incognito_active_index,
        });
    }

    fn on_state_loaded(&self) {
        self.events.lock().push("state_loaded");
        self.state_loaded.notify_called();
    }

    fn on_metadata_saved_asynchronously(&self) {
        self.metadata_saved.notify_called();
    }
}

// ============================================================================
// On-disk Fixture
// ============================================================================

/// A temporary state root shared by consecutive stores.
pub struct Fixture {
    root: TempDir,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        let root = TempDir::with_prefix("tab-persistence-test-").context("temp dir")?;
        Ok(Self { root })
    }

    pub fn base(&self) -> &Path {
        self.root.path()
    }

    pub fn directory(&self) -> anyhow::Result<StateDirectory> {
        Ok(StateDirectory::from_path(self.base(), 0)?)
    }

    pub fn metadata_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.directory()?.metadata_path())
    }

    pub fn tab_state_path(&self, id: i32, incognito: bool) -> anyhow::Result<PathBuf> {
        Ok(self
            .directory()?
            .tab_state_path(TabId::from_raw(id), incognito))
    }

    pub fn url_for(id: i32) -> String {
        format!("https://tab{}.test/", id)
    }

    /// Writes a metadata file listing `tabs` as `(id, incognito)` pairs.
    pub fn write_metadata(
        &self,
        tabs: &[(i32, bool)],
        active_regular: i32,
        active_incognito: i32,
        incognito_selected: bool,
    ) -> anyhow::Result<()> {
        let metadata = TabListMetadata {
            active_regular: TabId::from_raw(active_regular),
            active_incognito: TabId::from_raw(active_incognito),
            incognito_selected,
            tabs: tabs
                .iter()
                .map(|&(id, incognito)| {
                    TabListEntry::new(TabId::from_raw(id), Self::url_for(id), incognito)
                })
                .collect(),
            ..TabListMetadata::default()
        };
        metadata.write_to(&self.metadata_path()?)?;
        Ok(())
    }

    /// Writes a state blob for one tab.
    pub fn write_tab_state(&self, id: i32, incognito: bool) -> anyhow::Result<()> {
        let state = TabState::with_entry(Self::url_for(id), format!("Tab {}", id), incognito);
        state.save_to(&self.tab_state_path(id, incognito)?)?;
        Ok(())
    }

    /// Writes metadata plus a blob for every listed tab.
    pub fn write_session(&self, tabs: &[(i32, bool)], active_regular: i32) -> anyhow::Result<()> {
        for &(id, incognito) in tabs {
            self.write_tab_state(id, incognito)?;
        }
        self.write_metadata(tabs, active_regular, -1, false)
    }

    pub fn read_metadata(&self) -> anyhow::Result<Option<TabListMetadata>> {
        Ok(TabListMetadata::read_from(&self.metadata_path()?)?)
    }

    /// IDs listed in the metadata file, in file order.
    pub fn listed_ids(&self) -> Vec<i32> {
        self.read_metadata()
            .ok()
            .flatten()
            .map(|m| m.tabs.iter().map(|e| e.id.as_i32()).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A selector, its mock creators, and a store over a fixture directory.
pub struct Harness {
    pub selector: TabModelSelector,
    pub creators: Arc<MockTabCreatorManager>,
    pub observer: Arc<RecordingObserver>,
    pub store: TabPersistentStore,
}

impl Harness {
    pub fn start(fixture: &Fixture, options: StoreOptions) -> anyhow::Result<Self> {
        Self::start_with(fixture, options, MockTabCreatorManager::new)
    }

    /// Starts a store whose creators come from `creators`.
    pub fn start_with(
        fixture: &Fixture,
        options: StoreOptions,
        creators: impl FnOnce(&TabModelSelector) -> MockTabCreatorManager,
    ) -> anyhow::Result<Self> {
        let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
        let creators = Arc::new(creators(&selector));
        let observer = Arc::new(RecordingObserver::default());

        let store = TabPersistentStore::builder()
            .state_directory(fixture.directory()?)
            .options(options)
            .selector(selector.clone())
            .tab_creators(creators.clone())
            .observer(observer.clone())
            .build()?;

        Ok(Self {
            selector,
            creators,
            observer,
            store,
        })
    }

    /// Loads and restores everything.
    pub async fn restore(fixture: &Fixture, options: StoreOptions) -> anyhow::Result<Self> {
        let harness = Self::start(fixture, options)?;
        harness.store.load_state().await?;
        harness.store.restore_tabs(true).await?;
        Ok(harness)
    }

    /// Visible tab IDs of one model.
    pub fn ids(&self, incognito: bool) -> Vec<i32> {
        self.selector
            .model(incognito)
            .tabs()
            .iter()
            .map(|tab| tab.id().as_i32())
            .collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.store.shutdown();
        self.selector.destroy();
    }
}
