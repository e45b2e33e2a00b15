//! Serialized navigation state of a single tab.
//!
//! A [`TabState`] is the durable blob written per tab. It is wrapped in a
//! versioned JSON envelope:
//!
//! ```json
//! {
//!   "version": 1,
//!   "state": {
//!     "navigations": [{ "url": "https://example.com/", "title": "Example" }],
//!     "current_index": 0,
//!     "parent_id": -1,
//!     "timestamp_millis": 1700000000000,
//!     "incognito": false
//!   }
//! }
//! ```
//!
//! Readers accept any envelope version and ignore fields they do not know.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// Constants
// ============================================================================

/// Envelope version written by this crate.
pub const TAB_STATE_VERSION: u32 = 1;

// ============================================================================
// NavigationEntry
// ============================================================================

/// One entry of a tab's back/forward history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEntry {
    /// Virtual URL shown to the user.
    pub url: String,
    /// Page title, empty if unknown.
    #[serde(default)]
    pub title: String,
}

impl NavigationEntry {
    /// Creates a navigation entry.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

// ============================================================================
// TabState
// ============================================================================

/// Navigation history and metadata of one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabState {
    /// Back/forward history, oldest first.
    #[serde(default)]
    pub navigations: Vec<NavigationEntry>,
    /// Index of the current entry in `navigations`.
    #[serde(default)]
    pub current_index: usize,
    /// Tab that opened this one.
    #[serde(default)]
    pub parent_id: TabId,
    /// Last time the tab was shown, in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp_millis: u64,
    /// External application that opened the tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener_app_id: Option<String>,
    /// Page theme color as `0xAARRGGBB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<u32>,
    /// Whether the tab belongs to the incognito profile.
    #[serde(default)]
    pub incognito: bool,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    state: &'a TabState,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    state: TabState,
}

// ============================================================================
// TabState - Constructors
// ============================================================================

impl TabState {
    /// Creates a state with a single navigation entry.
    #[must_use]
    pub fn with_entry(url: impl Into<String>, title: impl Into<String>, incognito: bool) -> Self {
        Self {
            navigations: vec![NavigationEntry::new(url, title)],
            current_index: 0,
            parent_id: TabId::INVALID,
            timestamp_millis: now_millis(),
            opener_app_id: None,
            theme_color: None,
            incognito,
        }
    }
}

// ============================================================================
// TabState - Accessors
// ============================================================================

impl TabState {
    /// Returns the current navigation entry.
    #[must_use]
    pub fn current_entry(&self) -> Option<&NavigationEntry> {
        self.navigations.get(self.current_index)
    }

    /// Returns the title of the current entry.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.current_entry().map_or("", |entry| entry.title.as_str())
    }

    /// Returns the URL of the current entry.
    #[must_use]
    pub fn virtual_url(&self) -> &str {
        self.current_entry().map_or("", |entry| entry.url.as_str())
    }

    /// Returns `true` if the history holds no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.navigations.is_empty()
    }
}

// ============================================================================
// TabState - Codec
// ============================================================================

impl TabState {
    /// Serializes into a versioned blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            version: TAB_STATE_VERSION,
            state: self,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Parses a blob produced by [`encode`](Self::encode).
    ///
    /// `origin` only labels errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptState`] if the payload is not a tab state or
    /// its current index points outside the history.
    pub fn decode(bytes: &[u8], origin: &Path) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupt_state(origin, e.to_string()))?;

        if envelope.version > TAB_STATE_VERSION {
            trace!(
                version = envelope.version,
                path = %origin.display(),
                "Reading newer tab state version"
            );
        }

        let state = envelope.state;
        if !state.navigations.is_empty() && state.current_index >= state.navigations.len() {
            return Err(Error::corrupt_state(
                origin,
                format!(
                    "current index {} outside history of {}",
                    state.current_index,
                    state.navigations.len()
                ),
            ));
        }

        Ok(state)
    }
}

// ============================================================================
// TabState - Files
// ============================================================================

impl TabState {
    /// Atomically writes the state to `path`.
    ///
    /// The previous file stays intact until the new one is complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or moved into place.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        write_atomically(path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Tab state written");
        Ok(())
    }

    /// Reads the state stored at `path`.
    ///
    /// Returns `Ok(None)` if there is no file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptState`] if the file exists but cannot be
    /// decoded, or [`Error::Io`] for other read failures.
    pub fn restore_from(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Self::decode(&bytes, path).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Writes `bytes` to a sibling temp file, syncs it, and renames it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::config(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    fn sample_state() -> TabState {
        TabState {
            navigations: vec![
                NavigationEntry::new("https://example.com/", "Example"),
                NavigationEntry::new("https://example.com/about", "About"),
            ],
            current_index: 1,
            parent_id: TabId::from_raw(4),
            timestamp_millis: 1_700_000_000_000,
            opener_app_id: Some("com.example.reader".into()),
            theme_color: Some(0xFF33_6699),
            incognito: false,
        }
    }

    #[test]
    fn test_current_entry_accessors() {
        let state = sample_state();
        assert_eq!(state.display_title(), "About");
        assert_eq!(state.virtual_url(), "https://example.com/about");
    }

    #[test]
    fn test_empty_state_accessors() {
        let state = TabState {
            navigations: Vec::new(),
            ..sample_state()
        };
        assert!(state.is_empty());
        assert_eq!(state.display_title(), "");
        assert_eq!(state.virtual_url(), "");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let blob = br#"{
            "version": 9,
            "state": {
                "navigations": [{"url": "https://a.test/", "title": "A", "favicon": "x"}],
                "current_index": 0,
                "incognito": true,
                "scroll_offset": 120
            },
            "checksum": "abc"
        }"#;
        let state = TabState::decode(blob, Path::new("tab1")).unwrap();
        assert_eq!(state.virtual_url(), "https://a.test/");
        assert!(state.incognito);
        assert_eq!(state.parent_id, TabId::INVALID);
    }

    #[test]
    fn test_decode_rejects_bad_index() {
        let blob = br#"{"version":1,"state":{"navigations":[{"url":"a"}],"current_index":3}}"#;
        let err = TabState::decode(blob, Path::new("tab2")).unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = TabState::decode(b"\x00\x01garbage", Path::new("tab3")).unwrap_err();
        assert!(err.is_missing_data());
    }

    #[test]
    fn test_save_and_restore_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tab5");

        let state = sample_state();
        state.save_to(&path).unwrap();

        let restored = TabState::restore_from(&path).unwrap().unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_restore_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let restored = TabState::restore_from(&dir.path().join("tab99")).unwrap();
        assert!(restored.is_none());
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tab6");

        TabState::with_entry("https://old.test/", "Old", false)
            .save_to(&path)
            .unwrap();
        TabState::with_entry("https://new.test/", "New", false)
            .save_to(&path)
            .unwrap();

        let restored = TabState::restore_from(&path).unwrap().unwrap();
        assert_eq!(restored.display_title(), "New");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
