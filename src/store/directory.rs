//! On-disk layout of persisted tab state.
//!
//! Each selector index owns one directory under the base directory:
//!
//! ```text
//! <base>/
//! └── <selector_index>/
//!     ├── tab_state<selector_index>   metadata file
//!     ├── tab<id>                     regular tab state
//!     └── cryptonito<id>              incognito tab state
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tab_persistence::store::StateDirectory;
//!
//! # fn example() -> tab_persistence::Result<()> {
//! let dir = StateDirectory::from_path("./tabs", 0)?;
//! println!("Metadata at: {}", dir.metadata_path().display());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of the metadata file name.
const METADATA_PREFIX: &str = "tab_state";

/// Prefix of regular tab state files.
const REGULAR_PREFIX: &str = "tab";

/// Prefix of incognito tab state files.
const INCOGNITO_PREFIX: &str = "cryptonito";

// ============================================================================
// StateDirectory
// ============================================================================

/// Directory holding the metadata file and tab state blobs of one selector.
///
/// # Temporary Directories
///
/// Created with [`StateDirectory::new_temp()`], these are deleted when the
/// last handle is dropped. Intended for tests and benchmarks.
///
/// # Persistent Directories
///
/// Created with [`StateDirectory::from_path()`].
#[derive(Debug)]
pub struct StateDirectory {
    /// Keeps a temporary base directory alive.
    _temp_dir: Option<TempDir>,
    /// Base directory shared by all selector indices.
    base: PathBuf,
    /// Directory of this selector index.
    path: PathBuf,
    /// Selector index.
    selector_index: u32,
}

// ============================================================================
// StateDirectory - Constructors
// ============================================================================

impl StateDirectory {
    /// Creates a temporary base directory and the directory for `selector_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new_temp(selector_index: u32) -> Result<Self> {
        let temp_dir = TempDir::with_prefix("tab-persistence-")
            .map_err(|e| Error::config(format!("Failed to create temp state directory: {}", e)))?;
        let base = temp_dir.path().to_path_buf();
        let mut dir = Self::from_path(base, selector_index)?;
        dir._temp_dir = Some(temp_dir);
        Ok(dir)
    }

    /// Uses `base` as the state root, creating the selector directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn from_path(base: impl Into<PathBuf>, selector_index: u32) -> Result<Self> {
        let base = base.into();
        let path = base.join(selector_index.to_string());

        if !path.exists() {
            fs::create_dir_all(&path).map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory at {}: {}",
                    path.display(),
                    e
                ))
            })?;
            debug!(path = %path.display(), "Created state directory");
        } else {
            debug!(path = %path.display(), "Using existing state directory");
        }

        Ok(Self {
            _temp_dir: None,
            base,
            path,
            selector_index,
        })
    }
}

// ============================================================================
// StateDirectory - Paths
// ============================================================================

impl StateDirectory {
    /// Returns the base directory.
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the directory of this selector index.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the selector index.
    #[inline]
    #[must_use]
    pub fn selector_index(&self) -> u32 {
        self.selector_index
    }

    /// Returns the metadata file path.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.path
            .join(format!("{}{}", METADATA_PREFIX, self.selector_index))
    }

    /// Returns the state blob path of a tab.
    #[must_use]
    pub fn tab_state_path(&self, id: TabId, incognito: bool) -> PathBuf {
        let prefix = if incognito {
            INCOGNITO_PREFIX
        } else {
            REGULAR_PREFIX
        };
        self.path.join(format!("{}{}", prefix, id))
    }
}

// ============================================================================
// StateDirectory - Files
// ============================================================================

impl StateDirectory {
    /// Parses a blob file name into its tab ID and profile flag.
    #[must_use]
    pub fn parse_tab_state_file_name(name: &str) -> Option<(TabId, bool)> {
        let (rest, incognito) = if let Some(rest) = name.strip_prefix(INCOGNITO_PREFIX) {
            (rest, true)
        } else if name.starts_with(METADATA_PREFIX) {
            return None;
        } else {
            (name.strip_prefix(REGULAR_PREFIX)?, false)
        };
        let raw: i32 = rest.parse().ok()?;
        TabId::new(raw).map(|id| (id, incognito))
    }

    /// Lists every tab state blob present on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list_tab_state_files(&self) -> Result<Vec<(TabId, bool)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str()
                && let Some(parsed) = Self::parse_tab_state_file_name(name)
            {
                found.push(parsed);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Deletes a tab state blob. A missing file is not an error.
    ///
    /// Returns `true` if a file was removed.
    pub fn delete_tab_state(&self, id: TabId, incognito: bool) -> bool {
        let path = self.tab_state_path(id, incognito);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(tab_id = %id, incognito, "Tab state deleted");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete tab state");
                false
            }
        }
    }

    /// Deletes the metadata file and every tab state blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn clear(&self) -> Result<()> {
        for (id, incognito) in self.list_tab_state_files()? {
            self.delete_tab_state(id, incognito);
        }
        match fs::remove_file(self.metadata_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %self.path.display(), "State directory cleared");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
