//! Tab list metadata file.
//!
//! The metadata file enumerates every persisted tab in order and records
//! which tab was active in each model. It is rewritten wholesale through a
//! temp file and an atomic rename, so readers see either the old or the new
//! list.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 2,
//!   "active_regular": 5,
//!   "active_incognito": -1,
//!   "incognito_selected": false,
//!   "tabs": [
//!     { "id": 3, "url": "https://example.com/", "incognito": false },
//!     { "id": 5, "url": "https://example.org/", "incognito": false }
//!   ]
//! }
//! ```
//!
//! | Version | Change |
//! |---------|--------|
//! | 1 | Initial format |
//! | 2 | Adds `incognito_selected` |
//!
//! Older versions parse with defaults for missing fields. Unknown fields
//! are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::tab::state::write_atomically;

// ============================================================================
// Constants
// ============================================================================

/// Metadata version written by this crate.
pub const METADATA_VERSION: u32 = 2;

// ============================================================================
// TabListEntry
// ============================================================================

/// One persisted tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabListEntry {
    /// Tab ID.
    pub id: TabId,
    /// Last known URL.
    #[serde(default)]
    pub url: String,
    /// Profile flag.
    #[serde(default)]
    pub incognito: bool,
}

impl TabListEntry {
    /// Creates an entry.
    #[inline]
    #[must_use]
    pub fn new(id: TabId, url: impl Into<String>, incognito: bool) -> Self {
        Self {
            id,
            url: url.into(),
            incognito,
        }
    }
}

// ============================================================================
// TabListMetadata
// ============================================================================

/// Contents of the metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabListMetadata {
    /// Format version.
    pub version: u32,
    /// Active regular tab, or [`TabId::INVALID`].
    #[serde(default)]
    pub active_regular: TabId,
    /// Active incognito tab, or [`TabId::INVALID`].
    #[serde(default)]
    pub active_incognito: TabId,
    /// Whether the incognito model was showing.
    #[serde(default)]
    pub incognito_selected: bool,
    /// Tabs in file order.
    #[serde(default)]
    pub tabs: Vec<TabListEntry>,
}

impl Default for TabListMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            active_regular: TabId::INVALID,
            active_incognito: TabId::INVALID,
            incognito_selected: false,
            tabs: Vec::new(),
        }
    }
}

// ============================================================================
// TabListMetadata - Accessors
// ============================================================================

impl TabListMetadata {
    /// Returns the number of listed tabs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Returns `true` if no tab is listed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Returns the number of incognito entries.
    #[must_use]
    pub fn incognito_count(&self) -> usize {
        self.tabs.iter().filter(|entry| entry.incognito).count()
    }

    /// Returns the largest listed ID.
    #[must_use]
    pub fn max_id(&self) -> Option<TabId> {
        self.tabs.iter().map(|entry| entry.id).max()
    }
}

// ============================================================================
// TabListMetadata - Codec
// ============================================================================

impl TabListMetadata {
    /// Serializes the metadata, stamping the current version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut current = self.clone();
        current.version = METADATA_VERSION;
        Ok(serde_json::to_vec_pretty(&current)?)
    }

    /// Parses metadata bytes. `origin` only labels errors.
    ///
    /// Entries with invalid IDs and repeated IDs are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptState`] if the bytes are not metadata.
    pub fn decode(bytes: &[u8], origin: &Path) -> Result<Self> {
        let mut metadata: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupt_state(origin, e.to_string()))?;

        let mut seen = FxHashSet::default();
        let before = metadata.tabs.len();
        metadata
            .tabs
            .retain(|entry| entry.id.is_valid() && seen.insert(entry.id));
        if metadata.tabs.len() != before {
            debug!(
                dropped = before - metadata.tabs.len(),
                path = %origin.display(),
                "Dropped invalid metadata entries"
            );
        }

        trace!(version = metadata.version, count = metadata.tabs.len(), "Metadata decoded");
        Ok(metadata)
    }

    /// Reads the metadata file.
    ///
    /// Returns `Ok(None)` if there is no file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptState`] for undecodable contents and
    /// [`Error::Io`] for other read failures.
    pub fn read_from(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(None),
            Ok(bytes) => Self::decode(&bytes, path).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replaces the metadata file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or moved into place.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        write_atomically(path, &bytes)?;
        debug!(path = %path.display(), count = self.tabs.len(), "Metadata written");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
