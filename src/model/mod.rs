//! Live tab models.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TabModel`] | Ordered tabs of one profile with undoable closures |
//! | [`TabModelSelector`] | Owner of the regular and incognito models |
//! | [`TabModelObserver`] | Model lifecycle notifications |
//! | [`TabCreator`] | UI-side tab factory |
//!
//! Models are mutated from one logical owner (the UI task). The persistent
//! store only snapshots them.

// ============================================================================
// Submodules
// ============================================================================

/// Tab factory interfaces.
pub mod creator;

/// Model observer interface.
pub mod observer;

/// Regular/incognito model pair.
pub mod selector;

/// Ordered tab collection.
pub mod tab_model;

// ============================================================================
// Re-exports
// ============================================================================

pub use creator::{TabCreator, TabCreatorManager};
pub use observer::TabModelObserver;
pub use selector::TabModelSelector;
pub use tab_model::{ClosureState, TabModel};
