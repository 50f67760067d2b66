//! Replay guard
//!
//! Remembers every `(ratchet key fingerprint, counter)` that decrypted
//! successfully. Entries are only recorded after authentication, so a
//! forged header can never block a later genuine delivery.

use std::collections::HashSet;

use crate::error::{CryptoError, Result};
use crate::keys::KeyFingerprint;

/// Append-only set of accepted messages.
#[derive(Debug, Clone, Default)]
pub struct ReplayGuard {
    received: HashSet<(KeyFingerprint, u32)>,
}

impl ReplayGuard {
    /// Fail with [`CryptoError::ReplayDetected`] if the pair was already accepted.
    pub fn check(&self, ratchet: &KeyFingerprint, counter: u32) -> Result<()> {
        if self.received.contains(&(*ratchet, counter)) {
            return Err(CryptoError::ReplayDetected);
        }
        Ok(())
    }

    /// Record an authenticated message.
    pub fn record(&mut self, ratchet: KeyFingerprint, counter: u32) {
        self.received.insert((ratchet, counter));
    }

    /// Number of accepted messages.
    pub fn len(&self) -> usize {
        self.received.len()
    }

    /// Whether nothing has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.received.is_empty()
    }
}
