//! Tabs and their persisted navigation state.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Tab`] handle, constructors, navigation |
//! | `state` | [`TabState`] blob codec |
//!
//! # Example
//!
//! ```ignore
//! let tab = Tab::new(ids.generate(), false, TabId::INVALID, TabLaunchType::FromLink,
//!     "https://example.com")?;
//! tab.load_url("https://example.com/docs", "Docs")?;
//!
//! let state = tab.state().expect("navigated tab has state");
//! state.save_to(&path)?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod core;

/// Per-tab state blob codec.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::{Tab, TabLaunchType};
pub use state::{NavigationEntry, TAB_STATE_VERSION, TabState};
