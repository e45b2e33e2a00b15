//! Background writer for asynchronous saves.
//!
//! One task per store. Save requests only flip a flag and wake the task, so
//! any number of requests between two wake-ups collapse into one write. The
//! task snapshots the models when the write starts, never when the request
//! was made.
//!
//! ```text
//! model mutation ──► request_metadata() ──► Notify (one stored permit)
//!                                               │
//!                        writer task ◄──────────┘
//!                          sleep(save_delay)
//!                          snapshot + spawn_blocking(write)
//!                          on_metadata_saved_asynchronously()
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, trace};

use super::persistent::StoreInner;

// ============================================================================
// SaveSignal
// ============================================================================

/// Wake-up channel between the store and its writer task.
#[derive(Debug, Default)]
pub(crate) struct SaveSignal {
    notify: Notify,
    metadata_dirty: AtomicBool,
    shutdown: AtomicBool,
}

impl SaveSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Requests a metadata write and wakes the writer.
    pub(crate) fn request_metadata(&self) {
        self.metadata_dirty.store(true, Ordering::Release);
        self.wake();
    }

    /// Wakes the writer without marking the metadata dirty.
    pub(crate) fn wake(&self) {
        self.notify.notify_one();
    }

    /// Clears and returns the metadata dirty flag.
    pub(crate) fn take_metadata_dirty(&self) -> bool {
        self.metadata_dirty.swap(false, Ordering::AcqRel)
    }

    /// Stops the writer after its current write.
    pub(crate) fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

// ============================================================================
// Writer Task
// ============================================================================

/// Runs until the store shuts down or is dropped.
pub(crate) async fn run_writer(store: Weak<StoreInner>, signal: Arc<SaveSignal>, delay: Duration) {
    debug!("Tab state writer started");

    loop {
        signal.notify.notified().await;
        if signal.is_shutdown() {
            break;
        }
        if !delay.is_zero() {
            sleep(delay).await;
            if signal.is_shutdown() {
                break;
            }
        }

        let Some(store) = store.upgrade() else {
            break;
        };
        trace!("Writer woke");
        store.run_pending_save().await;
    }

    debug!("Tab state writer stopped");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_flag_is_taken_once() {
        let signal = SaveSignal::new();
        signal.request_metadata();
        signal.request_metadata();
        assert!(signal.take_metadata_dirty());
        assert!(!signal.take_metadata_dirty());
    }

    #[test]
    fn test_shutdown_is_sticky() {
        let signal = SaveSignal::new();
        assert!(!signal.is_shutdown());
        signal.shutdown();
        signal.shutdown();
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_writer_exits_when_store_is_gone() {
        let signal = Arc::new(SaveSignal::new());
        signal.wake();
        tokio_test::block_on(run_writer(Weak::new(), Arc::clone(&signal), Duration::ZERO));
    }

    #[test]
    fn test_writer_exits_on_shutdown() {
        let signal = Arc::new(SaveSignal::new());
        signal.shutdown();
        tokio_test::block_on(run_writer(Weak::new(), Arc::clone(&signal), Duration::ZERO));
    }
}
