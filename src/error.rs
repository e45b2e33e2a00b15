//! Error types for tab persistence.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use tab_persistence::{Result, Error};
//!
//! fn example(model: &TabModel) -> Result<()> {
//!     let tab = model.get_tab_at(0)?;
//!     model.close_tab(&tab, false, false, true)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Caller contract | [`Error::TabNotFound`], [`Error::DuplicateTab`], [`Error::IndexOutOfRange`], [`Error::TabDestroyed`], [`Error::InvalidState`] |
//! | Data | [`Error::InvalidUrl`], [`Error::CorruptState`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Persist`], [`Error::TaskJoin`] |
//!
//! Missing or corrupt persisted data never escapes `load_state` or
//! `restore_tabs` as an error. It is logged and resolves to fewer restored
//! tabs.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use tempfile::PersistError;
use thiserror::Error;
use tokio::task::JoinError;

use crate::identifiers::TabId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when store configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Caller Contract Errors
    // ========================================================================
    /// Tab not found.
    ///
    /// Returned when a tab ID does not exist in the model.
    #[error("Tab not found: {tab_id}")]
    TabNotFound {
        /// The missing tab ID.
        tab_id: TabId,
    },

    /// Tab already present.
    ///
    /// Returned when adding a tab whose ID is already in a model.
    #[error("Duplicate tab: {tab_id}")]
    DuplicateTab {
        /// The duplicated tab ID.
        tab_id: TabId,
    },

    /// Index outside of the visible tab range.
    #[error("Tab index {index} out of range (count={count})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of visible tabs.
        count: usize,
    },

    /// Operation on a destroyed tab.
    #[error("Tab destroyed: {tab_id}")]
    TabDestroyed {
        /// The destroyed tab's ID.
        tab_id: TabId,
    },

    /// Operation issued in the wrong lifecycle phase.
    ///
    /// Returned for double restore, restore before load, and similar
    /// interleavings that are not supported.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the violated precondition.
        message: String,
    },

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// URL could not be parsed.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parser message.
        message: String,
    },

    /// Persisted data is unreadable.
    #[error("Corrupt state at {}: {message}", path.display())]
    CorruptState {
        /// File holding the corrupt data.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Temporary file could not be moved into place.
    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    /// Background task failed.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] JoinError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a tab not found error.
    #[inline]
    pub fn tab_not_found(tab_id: TabId) -> Self {
        Self::TabNotFound { tab_id }
    }

    /// Creates a duplicate tab error.
    #[inline]
    pub fn duplicate_tab(tab_id: TabId) -> Self {
        Self::DuplicateTab { tab_id }
    }

    /// Creates an index out of range error.
    #[inline]
    pub fn index_out_of_range(index: usize, count: usize) -> Self {
        Self::IndexOutOfRange { index, count }
    }

    /// Creates a tab destroyed error.
    #[inline]
    pub fn tab_destroyed(tab_id: TabId) -> Self {
        Self::TabDestroyed { tab_id }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a corrupt state error.
    #[inline]
    pub fn corrupt_state(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the caller broke an API precondition.
    #[inline]
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::TabNotFound { .. }
                | Self::DuplicateTab { .. }
                | Self::IndexOutOfRange { .. }
                | Self::TabDestroyed { .. }
                | Self::InvalidState { .. }
        )
    }

    /// Returns `true` if persisted data was absent or unreadable.
    #[inline]
    #[must_use]
    pub fn is_missing_data(&self) -> bool {
        match self {
            Self::CorruptState { .. } | Self::Json(_) => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the save is retried.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Persist(_) | Self::TaskJoin(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::index_out_of_range(5, 3);
        assert_eq!(err.to_string(), "Tab index 5 out of range (count=3)");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing state directory");
        assert_eq!(err.to_string(), "Configuration error: missing state directory");
    }

    #[test]
    fn test_tab_not_found_display() {
        let err = Error::tab_not_found(TabId::from_raw(7));
        assert_eq!(err.to_string(), "Tab not found: 7");
    }

    #[test]
    fn test_is_contract_violation() {
        assert!(Error::duplicate_tab(TabId::from_raw(1)).is_contract_violation());
        assert!(Error::invalid_state("restore twice").is_contract_violation());
        assert!(!Error::config("test").is_contract_violation());
    }

    #[test]
    fn test_is_missing_data() {
        let missing = Error::Io(IoError::new(ErrorKind::NotFound, "gone"));
        let denied = Error::Io(IoError::new(ErrorKind::PermissionDenied, "nope"));

        assert!(missing.is_missing_data());
        assert!(!denied.is_missing_data());
        assert!(Error::corrupt_state("/tmp/tab3", "truncated").is_missing_data());
    }

    #[test]
    fn test_is_recoverable() {
        let io_err = Error::Io(IoError::other("disk full"));
        assert!(io_err.is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
