//! Save and restore benchmark suite.
//!
//! Benchmarks the persistent store at different session sizes:
//! - Tab counts: 10, 100, 500
//! - Synchronous save of an open session
//! - Load + restore of a saved session
//!
//! Run with: cargo bench --bench save_restore
//! Results saved to: target/criterion/

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tab_persistence::{
    Result, StateDirectory, Tab, TabCreator, TabCreatorManager, TabId, TabIdAllocator,
    TabLaunchType, TabListEntry, TabListMetadata, TabModelSelector, TabPersistentStore, TabState,
};
use tempfile::TempDir;
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const TAB_COUNTS: &[usize] = &[10, 100, 500];

// ============================================================================
// Creators
// ============================================================================

struct BenchCreator {
    selector: TabModelSelector,
    incognito: bool,
}

impl TabCreator for BenchCreator {
    fn creates_tabs_asynchronously(&self) -> bool {
        false
    }

    fn create_new_tab(&self, url: &str, launch_type: TabLaunchType, _parent: Option<&Tab>) -> Result<Tab> {
        let tab = Tab::new(
            self.selector.next_tab_id(),
            self.incognito,
            TabId::INVALID,
            launch_type,
            url,
        )?;
        self.selector
            .model(self.incognito)
            .add_tab(tab.clone(), None, launch_type)?;
        Ok(tab)
    }

    fn create_frozen_tab(&self, state: TabState, id: TabId, index: usize) -> Result<Tab> {
        let tab = Tab::frozen_from_state(id, state);
        self.selector
            .model(self.incognito)
            .add_tab(tab.clone(), Some(index), TabLaunchType::FromRestore)?;
        Ok(tab)
    }
}

struct BenchCreators {
    regular: Arc<BenchCreator>,
    incognito: Arc<BenchCreator>,
}

impl TabCreatorManager for BenchCreators {
    fn tab_creator(&self, incognito: bool) -> Arc<dyn TabCreator> {
        if incognito {
            self.incognito.clone()
        } else {
            self.regular.clone()
        }
    }
}

fn store_for(root: &TempDir) -> Result<TabPersistentStore> {
    let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
    let creators = Arc::new(BenchCreators {
        regular: Arc::new(BenchCreator {
            selector: selector.clone(),
            incognito: false,
        }),
        incognito: Arc::new(BenchCreator {
            selector: selector.clone(),
            incognito: true,
        }),
    });

    TabPersistentStore::builder()
        .state_directory(StateDirectory::from_path(root.path(), 0)?)
        .selector(selector)
        .tab_creators(creators)
        .build()
}

/// Writes a session of `count` regular tabs.
fn write_session(root: &TempDir, count: usize) -> Result<()> {
    let dir = StateDirectory::from_path(root.path(), 0)?;
    let mut metadata = TabListMetadata::default();
    for raw in 0..count as i32 {
        let id = TabId::from_raw(raw);
        let url = format!("https://bench{}.test/", raw);
        TabState::with_entry(url.clone(), "Bench", false)
            .save_to(&dir.tab_state_path(id, false))?;
        metadata.tabs.push(TabListEntry::new(id, url, false));
    }
    metadata.active_regular = TabId::from_raw(count as i32 / 2);
    metadata.write_to(&dir.metadata_path())
}

// ============================================================================
// Benchmark: Synchronous Save
// ============================================================================

fn bench_save_state(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("save_state");
    group.sample_size(20);

    for &count in TAB_COUNTS {
        group.bench_with_input(BenchmarkId::new("tabs", count), &count, |b, &tab_count| {
            let root = TempDir::with_prefix("tab-bench-").unwrap();
            let store = rt.block_on(async { store_for(&root) }).unwrap();
            // Measure the synchronous path only.
            store.shutdown();
            for n in 0..tab_count {
                store
                    .selector()
                    .open_new_tab(
                        &format!("https://save{}.test/", n),
                        TabLaunchType::FromLink,
                        None,
                        false,
                    )
                    .unwrap();
            }

            b.iter(|| store.save_state().unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Load + Restore
// ============================================================================

fn bench_restore(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("restore");
    group.sample_size(10);

    for &count in TAB_COUNTS {
        let root = TempDir::with_prefix("tab-bench-").unwrap();
        write_session(&root, count).unwrap();

        group.bench_with_input(BenchmarkId::new("tabs", count), &count, |b, _| {
            b.to_async(&rt).iter(|| async {
                let store = store_for(&root).unwrap();
                store.load_state().await.unwrap();
                store.restore_tabs(true).await.unwrap();
                store.shutdown();
                store.selector().destroy();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_save_state, bench_restore);
criterion_main!(benches);
