//! Pending-upload registry: negotiated slots waiting for their bytes.
//!
//! Every operation takes the single registry lock for its whole duration, so a
//! claim and an expiry sweep touching the same slot are serialized and
//! whichever reaches the lock first decides the outcome.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A negotiated upload that has not been claimed or expired yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub filename: String,
    pub url: String,
    pub length: u64,
    pub timeout_remaining: u64,
}

impl Slot {
    pub fn new(filename: String, base_url: &str, length: u64, timeout: u64) -> Self {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), filename);
        Self {
            filename,
            url,
            length,
            timeout_remaining: timeout,
        }
    }
}

/// Concurrency-safe store of pending slots keyed by filename.
#[derive(Debug, Default)]
pub struct Registry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a slot. A live slot under the same filename wins and the new
    /// one is handed back untouched.
    pub async fn insert(&self, slot: Slot) -> Result<(), Slot> {
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&slot.filename) {
            return Err(slot);
        }
        debug!(filename = slot.filename, length = slot.length, "slot registered");
        slots.insert(slot.filename.clone(), slot);
        Ok(())
    }

    /// Removes and returns the slot for `filename`. At most one caller can
    /// ever receive a given slot.
    pub async fn claim(&self, filename: &str) -> Option<Slot> {
        let slot = self.slots.lock().await.remove(filename);
        if slot.is_some() {
            debug!(filename, "slot claimed");
        }
        slot
    }

    /// Ages every slot by `step` seconds and evicts the ones that ran out.
    /// Returns the filenames that expired during this sweep.
    pub async fn sweep(&self, step: u64) -> Vec<String> {
        let mut slots = self.slots.lock().await;
        let mut expired = Vec::new();
        slots.retain(|filename, slot| {
            slot.timeout_remaining = slot.timeout_remaining.saturating_sub(step);
            if slot.timeout_remaining == 0 {
                info!(filename, "upload request timed out");
                expired.push(filename.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Whether a live slot exists for `filename`.
    pub async fn contains(&self, filename: &str) -> bool {
        self.slots.lock().await.contains_key(filename)
    }

    /// Number of pending slots.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}
