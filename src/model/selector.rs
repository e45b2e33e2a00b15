//! Owner of the regular and incognito tab models.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::{TabId, TabIdAllocator};
use crate::tab::{Tab, TabLaunchType};

use super::creator::TabCreatorManager;
use super::tab_model::{HeldIds, TabModel};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a selector.
pub(crate) struct SelectorInner {
    regular: TabModel,
    incognito: TabModel,
    incognito_selected: AtomicBool,
    ids: Arc<TabIdAllocator>,
    creators: RwLock<Option<Arc<dyn TabCreatorManager>>>,
}

// ============================================================================
// TabModelSelector
// ============================================================================

/// Owns exactly two [`TabModel`]s and tracks which one is active.
///
/// # Example
///
/// ```ignore
/// let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
/// selector.set_tab_creator_manager(creators);
///
/// // Opens into incognito without switching away from the regular model.
/// let tab = selector.open_new_tab("https://example.com", TabLaunchType::FromLongpress, None, true)?;
/// assert!(!selector.is_incognito_selected());
/// ```
#[derive(Clone)]
pub struct TabModelSelector {
    pub(crate) inner: Arc<SelectorInner>,
}

impl fmt::Debug for TabModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabModelSelector")
            .field("regular", &self.inner.regular)
            .field("incognito", &self.inner.incognito)
            .field("incognito_selected", &self.is_incognito_selected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TabModelSelector - Constructor
// ============================================================================

impl TabModelSelector {
    /// Creates a selector with two empty models, regular model selected.
    #[must_use]
    pub fn new(ids: Arc<TabIdAllocator>) -> Self {
        let held = HeldIds::default();
        Self {
            inner: Arc::new(SelectorInner {
                regular: TabModel::with_held_ids(false, Arc::clone(&held)),
                incognito: TabModel::with_held_ids(true, held),
                incognito_selected: AtomicBool::new(false),
                ids,
                creators: RwLock::new(None),
            }),
        }
    }

    /// Installs the creators used by [`open_new_tab`](Self::open_new_tab).
    pub fn set_tab_creator_manager(&self, creators: Arc<dyn TabCreatorManager>) {
        *self.inner.creators.write() = Some(creators);
    }

    /// Returns the installed creator manager.
    #[must_use]
    pub fn tab_creator_manager(&self) -> Option<Arc<dyn TabCreatorManager>> {
        self.inner.creators.read().clone()
    }
}

// ============================================================================
// TabModelSelector - Models
// ============================================================================

impl TabModelSelector {
    /// Returns the regular or incognito model.
    #[inline]
    #[must_use]
    pub fn model(&self, incognito: bool) -> &TabModel {
        if incognito {
            &self.inner.incognito
        } else {
            &self.inner.regular
        }
    }

    /// Returns the active model.
    #[must_use]
    pub fn current_model(&self) -> &TabModel {
        self.model(self.is_incognito_selected())
    }

    /// Returns `true` while the incognito model is active.
    #[inline]
    #[must_use]
    pub fn is_incognito_selected(&self) -> bool {
        self.inner.incognito_selected.load(Ordering::Acquire)
    }

    /// Makes the regular or incognito model active.
    pub fn select_model(&self, incognito: bool) {
        let previous = self.inner.incognito_selected.swap(incognito, Ordering::AcqRel);
        if previous != incognito {
            debug!(incognito, "Tab model selected");
        }
    }

    /// Returns the active tab of the active model.
    #[must_use]
    pub fn current_tab(&self) -> Option<Tab> {
        self.current_model().current_tab()
    }

    /// Finds a tab in either model, pending closures included.
    #[must_use]
    pub fn tab_by_id(&self, id: TabId) -> Option<Tab> {
        self.inner
            .regular
            .tab_by_id(id)
            .or_else(|| self.inner.incognito.tab_by_id(id))
    }

    /// Returns the number of visible tabs across both models.
    #[must_use]
    pub fn total_tab_count(&self) -> usize {
        self.inner.regular.count() + self.inner.incognito.count()
    }
}

// ============================================================================
// TabModelSelector - Tab Creation
// ============================================================================

impl TabModelSelector {
    /// Returns the shared ID allocator.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &Arc<TabIdAllocator> {
        &self.inner.ids
    }

    /// Returns a fresh tab ID.
    #[inline]
    pub fn next_tab_id(&self) -> TabId {
        self.inner.ids.generate()
    }

    /// Opens a tab through the creator for `incognito`.
    ///
    /// The creator is chosen by the `incognito` argument, not by the active
    /// model, so a tab can be opened into the other profile without
    /// switching to it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no creator manager is installed
    /// - Any error returned by the creator
    pub fn open_new_tab(
        &self,
        url: &str,
        launch_type: TabLaunchType,
        parent: Option<&Tab>,
        incognito: bool,
    ) -> Result<Tab> {
        let creators = self.tab_creator_manager().ok_or_else(|| {
            Error::config(
                "No tab creators installed. Call set_tab_creator_manager() first.",
            )
        })?;
        creators
            .tab_creator(incognito)
            .create_new_tab(url, launch_type, parent)
    }
}

// ============================================================================
// TabModelSelector - Lifecycle
// ============================================================================

impl TabModelSelector {
    /// Commits pending closures in both models.
    pub fn commit_all_tab_closures(&self) {
        self.inner.regular.commit_all_tab_closures();
        self.inner.incognito.commit_all_tab_closures();
    }

    /// Tears down both models.
    pub fn destroy(&self) {
        self.inner.regular.destroy();
        self.inner.incognito.destroy();
        info!("Tab model selector destroyed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::creator::TabCreator;
    use crate::tab::TabState;

    struct ModelCreator {
        selector: TabModelSelector,
        incognito: bool,
    }

    impl TabCreator for ModelCreator {
        fn creates_tabs_asynchronously(&self) -> bool {
            false
        }

        fn create_new_tab(
            &self,
            url: &str,
            launch_type: TabLaunchType,
            parent: Option<&Tab>,
        ) -> Result<Tab> {
            let parent_id = parent.map_or(TabId::INVALID, Tab::id);
            let tab = Tab::new(
                self.selector.next_tab_id(),
                self.incognito,
                parent_id,
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

    struct Creators {
        regular: Arc<dyn TabCreator>,
        incognito: Arc<dyn TabCreator>,
    }

    impl TabCreatorManager for Creators {
        fn tab_creator(&self, incognito: bool) -> Arc<dyn TabCreator> {
            if incognito {
                Arc::clone(&self.incognito)
            } else {
                Arc::clone(&self.regular)
            }
        }
    }

    fn selector_with_creators() -> TabModelSelector {
        let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
        let creators = Creators {
            regular: Arc::new(ModelCreator {
                selector: selector.clone(),
                incognito: false,
            }),
            incognito: Arc::new(ModelCreator {
                selector: selector.clone(),
                incognito: true,
            }),
        };
        selector.set_tab_creator_manager(Arc::new(creators));
        selector
    }

    #[test]
    fn test_new_selector_is_regular() {
        let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
        assert!(!selector.is_incognito_selected());
        assert!(!selector.current_model().is_incognito());
        assert_eq!(selector.total_tab_count(), 0);
    }

    #[test]
    fn test_open_new_tab_without_creators_fails() {
        let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
        let err = selector
            .open_new_tab("https://a.test", TabLaunchType::FromLink, None, false)
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_open_new_tab_routes_by_flag_not_mode() {
        let selector = selector_with_creators();

        let tab = selector
            .open_new_tab("https://private.test", TabLaunchType::FromLongpress, None, true)
            .unwrap();

        assert!(tab.is_incognito());
        assert!(!selector.is_incognito_selected());
        assert_eq!(selector.model(true).count(), 1);
        assert_eq!(selector.model(false).count(), 0);
    }

    #[test]
    fn test_tab_by_id_searches_both_models() {
        let selector = selector_with_creators();
        let regular = selector
            .open_new_tab("https://a.test", TabLaunchType::FromLink, None, false)
            .unwrap();
        let private = selector
            .open_new_tab("https://b.test", TabLaunchType::FromLink, Some(&regular), true)
            .unwrap();

        assert_ne!(regular.id(), private.id());
        assert_eq!(selector.tab_by_id(private.id()), Some(private.clone()));
        assert_eq!(private.parent_id(), regular.id());
        assert_eq!(selector.total_tab_count(), 2);
    }

    #[test]
    fn test_select_model_switches_current_tab() {
        let selector = selector_with_creators();
        let regular = selector
            .open_new_tab("https://a.test", TabLaunchType::FromLink, None, false)
            .unwrap();
        let private = selector
            .open_new_tab("https://b.test", TabLaunchType::FromLink, None, true)
            .unwrap();

        assert_eq!(selector.current_tab(), Some(regular));
        selector.select_model(true);
        assert_eq!(selector.current_tab(), Some(private));
    }

    fn lazy_tab(id: TabId, incognito: bool, url: &str) -> Tab {
        Tab::for_lazy_load(id, incognito, TabId::INVALID, TabLaunchType::FromLink, url)
    }

    #[test]
    fn test_tab_id_is_unique_across_models() {
        let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
        let id = TabId::from_raw(7);
        let regular = lazy_tab(id, false, "https://a.test/");
        let private = lazy_tab(id, true, "https://b.test/");

        selector
            .model(false)
            .add_tab(regular.clone(), None, TabLaunchType::FromLink)
            .unwrap();
        let err = selector
            .model(true)
            .add_tab(private.clone(), None, TabLaunchType::FromLink)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTab { .. }));
        assert!(selector.model(true).is_empty());

        // Released once the regular tab is gone for good.
        selector.model(false).close_tab_by_id(id, false).unwrap();
        selector
            .model(true)
            .add_tab(private, None, TabLaunchType::FromLink)
            .unwrap();
        assert_eq!(selector.model(true).count(), 1);
    }

    #[test]
    fn test_pending_closure_keeps_id_reserved() {
        let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
        let id = TabId::from_raw(3);
        let regular = lazy_tab(id, false, "https://a.test/");
        selector
            .model(false)
            .add_tab(regular, None, TabLaunchType::FromLink)
            .unwrap();
        selector.model(false).close_tab_by_id(id, true).unwrap();

        let private = lazy_tab(id, true, "https://b.test/");
        assert!(
            selector
                .model(true)
                .add_tab(private, None, TabLaunchType::FromLink)
                .is_err()
        );
    }

    #[test]
    fn test_destroy_tears_down_both_models() {
        let selector = selector_with_creators();
        let a = selector
            .open_new_tab("https://a.test", TabLaunchType::FromLink, None, false)
            .unwrap();
        let b = selector
            .open_new_tab("https://b.test", TabLaunchType::FromLink, None, true)
            .unwrap();

        selector.destroy();
        assert!(a.is_destroyed() && b.is_destroyed());
        assert_eq!(selector.total_tab_count(), 0);
    }
}
