//! Builder pattern for store configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tab_persistence::{StoreOptions, TabCreatorManager, TabModelSelector, TabPersistentStore};
//!
//! # async fn example(
//! #     selector: TabModelSelector,
//! #     creators: Arc<dyn TabCreatorManager>,
//! # ) -> tab_persistence::Result<()> {
//! let store = TabPersistentStore::builder()
//!     .base_directory("/data/tabs")
//!     .options(StoreOptions::new().with_selector_index(1))
//!     .selector(selector)
//!     .tab_creators(creators)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::model::{TabCreatorManager, TabModelSelector};

use super::directory::StateDirectory;
use super::observer::{NoopStoreObserver, TabPersistentStoreObserver};
use super::options::StoreOptions;
use super::persistent::TabPersistentStore;

// ============================================================================
// TabPersistentStoreBuilder
// ============================================================================

/// Builder for configuring a [`TabPersistentStore`].
///
/// Use [`TabPersistentStore::builder()`] to create a new builder.
#[derive(Default)]
pub struct TabPersistentStoreBuilder {
    /// Root directory shared by all selector indices.
    base_directory: Option<PathBuf>,
    /// Prepared state directory.
    state_directory: Option<StateDirectory>,
    options: StoreOptions,
    selector: Option<TabModelSelector>,
    creators: Option<Arc<dyn TabCreatorManager>>,
    observer: Option<Arc<dyn TabPersistentStoreObserver>>,
}

impl fmt::Debug for TabPersistentStoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabPersistentStoreBuilder")
            .field("base_directory", &self.base_directory)
            .field("state_directory", &self.state_directory)
            .field("options", &self.options)
            .field("has_selector", &self.selector.is_some())
            .field("has_creators", &self.creators.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TabPersistentStoreBuilder Implementation
// ============================================================================

impl TabPersistentStoreBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root directory. The store uses `<base>/<selector_index>`.
    #[inline]
    #[must_use]
    pub fn base_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Uses an already prepared state directory.
    ///
    /// Takes precedence over [`base_directory`](Self::base_directory).
    #[inline]
    #[must_use]
    pub fn state_directory(mut self, directory: StateDirectory) -> Self {
        self.state_directory = Some(directory);
        self
    }

    /// Sets the store options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the selector whose models are persisted.
    #[inline]
    #[must_use]
    pub fn selector(mut self, selector: TabModelSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Sets the tab creators used by the restore.
    ///
    /// Falls back to the selector's creators when unset.
    #[inline]
    #[must_use]
    pub fn tab_creators(mut self, creators: Arc<dyn TabCreatorManager>) -> Self {
        self.creators = Some(creators);
        self
    }

    /// Sets the observer of restore and save milestones.
    #[inline]
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn TabPersistentStoreObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Builds the store and starts its writer task.
    ///
    /// Installs the creators on the selector if it has none.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] outside a Tokio runtime
    /// - [`Error::Config`] if the selector or creators are missing
    /// - [`Error::Config`] if the directory cannot be created or does not
    ///   match the selector index
    pub fn build(self) -> Result<TabPersistentStore> {
        let runtime = Self::validate_runtime()?;
        let selector = self.validate_selector()?;
        let creators = self.validate_creators(&selector)?;
        let options = self.options.clone();
        let observer = self
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopStoreObserver));
        let directory = self.validate_directory()?;

        if selector.tab_creator_manager().is_none() {
            selector.set_tab_creator_manager(Arc::clone(&creators));
        }

        Ok(TabPersistentStore::start(
            directory, options, selector, creators, observer, runtime,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TabPersistentStoreBuilder {
    fn validate_runtime() -> Result<Handle> {
        Handle::try_current().map_err(|_| {
            Error::config(
                "TabPersistentStore must be built inside a Tokio runtime.\n\
                 Example: call build() from an async fn driven by #[tokio::main]",
            )
        })
    }

    fn validate_selector(&self) -> Result<TabModelSelector> {
        self.selector.clone().ok_or_else(|| {
            Error::config(
                "A tab model selector is required. Use .selector() to set it.",
            )
        })
    }

    fn validate_creators(&self, selector: &TabModelSelector) -> Result<Arc<dyn TabCreatorManager>> {
        self.creators
            .clone()
            .or_else(|| selector.tab_creator_manager())
            .ok_or_else(|| {
                Error::config(
                    "Tab creators are required. Use .tab_creators() or install them on the selector.",
                )
            })
    }

    fn validate_directory(self) -> Result<StateDirectory> {
        let selector_index = self.options.selector_index;
        match (self.state_directory, self.base_directory) {
            (Some(directory), _) => {
                if directory.selector_index() != selector_index {
                    return Err(Error::config(format!(
                        "State directory belongs to selector {} but options use selector {}",
                        directory.selector_index(),
                        selector_index
                    )));
                }
                Ok(directory)
            }
            (None, Some(base)) => StateDirectory::from_path(base, selector_index),
            (None, None) => Err(Error::config(
                "A state directory is required. Use .base_directory() or .state_directory().\n\
                 Example: TabPersistentStore::builder().base_directory(\"./tabs\")",
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
