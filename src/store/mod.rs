//! Tab state persistence.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TabPersistentStore`] | Restores tabs at startup and saves them on change |
//! | [`TabPersistentStoreBuilder`] | Store configuration |
//! | [`StateDirectory`] | File layout of one selector |
//! | [`TabListMetadata`] | Ordered tab list file |
//! | [`TabPersistentStoreObserver`] | Restore and save milestones |
//!
//! All file I/O runs on Tokio's blocking pool except
//! [`TabPersistentStore::save_state`], which writes on the calling thread.

// ============================================================================
// Submodules
// ============================================================================

mod builder;
mod persistent;
mod writer;

/// File layout.
pub mod directory;

/// Tab list file codec.
pub mod metadata;

/// Store observer interface.
pub mod observer;

/// Store configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::TabPersistentStoreBuilder;
pub use directory::StateDirectory;
pub use metadata::{METADATA_VERSION, TabListEntry, TabListMetadata};
pub use observer::{NoopStoreObserver, TabPersistentStoreObserver};
pub use options::StoreOptions;
pub use persistent::{RestorePhase, TabPersistentStore};
