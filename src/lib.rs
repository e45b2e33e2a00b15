//! Tab persistence - Durable browser tab sessions.
//!
//! This library keeps the open tabs of a browser window on disk and brings
//! them back at startup, in their original order, with the previously
//! active tab restored first.
//!
//! # Architecture
//!
//! The crate follows a model/store split:
//!
//! - **Models**: a [`TabModelSelector`] owns one regular and one incognito
//!   [`TabModel`]. Models hold ordered tabs and support undoable closures.
//! - **Store**: a [`TabPersistentStore`] observes the models, writes each
//!   tab's [`TabState`] blob plus a [`TabListMetadata`] file, and replays
//!   them through the embedder's [`TabCreator`]s on the next launch.
//!
//! Key design principles:
//!
//! - Every write replaces its file atomically (temp file + rename)
//! - Saves are coalesced by a single background writer task
//! - Missing or corrupt files degrade to fewer restored tabs, never an error
//! - Tab IDs come from an injected [`TabIdAllocator`], never a global
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tab_persistence::{Result, TabCreatorManager, TabIdAllocator, TabModelSelector, TabPersistentStore};
//!
//! async fn start(creators: Arc<dyn TabCreatorManager>) -> Result<TabPersistentStore> {
//!     let selector = TabModelSelector::new(Arc::new(TabIdAllocator::new()));
//!     selector.set_tab_creator_manager(creators);
//!
//!     let store = TabPersistentStore::builder()
//!         .base_directory("/data/tabs")
//!         .selector(selector)
//!         .build()?;
//!
//!     store.load_state().await?;
//!     store.restore_tabs(true).await?;
//!     Ok(store)
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tab`] | [`Tab`] handles and the [`TabState`] blob |
//! | [`model`] | [`TabModel`], [`TabModelSelector`], observers and creators |
//! | [`store`] | [`TabPersistentStore`] and its file formats |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`TabId`] and its allocator |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Tab identifiers and ID allocation.
pub mod identifiers;

/// Live tab models.
///
/// - [`TabModel`] - Ordered tabs of one profile
/// - [`TabModelSelector`] - Regular/incognito model pair
pub mod model;

/// Tab state persistence.
///
/// Use [`TabPersistentStore::builder()`] to create a configured store.
pub mod store;

/// Tabs and their navigation state.
pub mod tab;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{TabId, TabIdAllocator};

// Model types
pub use model::{
    ClosureState, TabCreator, TabCreatorManager, TabModel, TabModelObserver, TabModelSelector,
};

// Store types
pub use store::{
    NoopStoreObserver, RestorePhase, StateDirectory, StoreOptions, TabListEntry, TabListMetadata,
    TabPersistentStore, TabPersistentStoreBuilder, TabPersistentStoreObserver,
};

// Tab types
pub use tab::{NavigationEntry, Tab, TabLaunchType, TabState};
