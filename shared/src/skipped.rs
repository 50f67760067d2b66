//! Cache of message keys for skipped counters
//!
//! Keys are stored under `(ratchet key fingerprint, counter)`. The cache is
//! bounded: once `capacity` is reached the oldest entry is evicted.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::chain::MessageKey;
use crate::keys::KeyFingerprint;

/// Lookup key of a skipped message key.
pub type SkippedKeyId = (KeyFingerprint, u32);

/// Bounded store of skipped message keys, evicting in insertion order.
#[derive(Debug, Clone)]
pub struct SkippedKeys {
    keys: HashMap<SkippedKeyId, MessageKey>,
    order: VecDeque<SkippedKeyId>,
    capacity: usize,
}

impl SkippedKeys {
    /// Empty cache holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Store a key, evicting the oldest entries if over capacity.
    pub fn insert(&mut self, ratchet: KeyFingerprint, counter: u32, key: MessageKey) {
        let id = (ratchet, counter);
        if self.keys.insert(id, key).is_none() {
            self.order.push_back(id);
        }
        while self.keys.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.keys.remove(&oldest).is_some() {
                warn!(
                    ratchet = %oldest.0.short(),
                    counter = oldest.1,
                    "Evicted skipped message key"
                );
            }
        }
    }

    /// Look up a key without removing it.
    pub fn get(&self, ratchet: &KeyFingerprint, counter: u32) -> Option<&MessageKey> {
        self.keys.get(&(*ratchet, counter))
    }

    /// Remove and return a key.
    pub fn take(&mut self, ratchet: &KeyFingerprint, counter: u32) -> Option<MessageKey> {
        let id = (*ratchet, counter);
        let key = self.keys.remove(&id)?;
        self.order.retain(|entry| *entry != id);
        Some(key)
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
