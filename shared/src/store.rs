//! Per-client trust store and session store
//!
//! Both are keyed by peer username and hold at most one entry per peer.
//! Nothing is ever rotated or expired; entries live as long as the client.

use std::collections::HashMap;
use std::sync::Arc;

use ed25519_dalek::Signature;
use parking_lot::Mutex;
use x25519_dalek::PublicKey;

use crate::certificate::{Certificate, CertificateVerifier};
use crate::error::{CryptoError, Result};
use crate::ratchet::RatchetSession;

/// A verified peer certificate.
#[derive(Debug, Clone)]
pub struct TrustEntry {
    /// Certificate as received.
    pub certificate: Certificate,
    /// Identity key, imported after signature verification.
    pub public_key: PublicKey,
}

/// Verified peer identities.
#[derive(Debug, Default)]
pub struct TrustStore {
    entries: HashMap<String, TrustEntry>,
}

impl TrustStore {
    /// Verify `certificate` and trust it for its username.
    ///
    /// A second certificate for an already trusted username is rejected.
    pub fn record(
        &mut self,
        verifier: &CertificateVerifier,
        certificate: &Certificate,
        signature: &Signature,
    ) -> Result<&TrustEntry> {
        let public_key = verifier.verify(certificate, signature)?;
        if self.entries.contains_key(&certificate.username) {
            return Err(CryptoError::DuplicateCertificate(certificate.username.clone()));
        }
        let entry = TrustEntry {
            certificate: certificate.clone(),
            public_key,
        };
        Ok(self
            .entries
            .entry(certificate.username.clone())
            .or_insert(entry))
    }

    /// Trusted entry for `username`.
    pub fn get(&self, username: &str) -> Option<&TrustEntry> {
        self.entries.get(username)
    }

    /// Trusted identity key for `username`, or [`CryptoError::NoCertificateForPeer`].
    pub fn public_key(&self, username: &str) -> Result<PublicKey> {
        self.entries
            .get(username)
            .map(|entry| entry.public_key)
            .ok_or_else(|| CryptoError::NoCertificateForPeer(username.to_string()))
    }

    /// Number of trusted peers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no peer is trusted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lock guarding one peer's session; `None` until the first successful
/// send or receive.
pub type SessionSlot = Arc<Mutex<Option<RatchetSession>>>;

/// Ratchet sessions by peer.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, SessionSlot>,
}

impl SessionStore {
    /// Existing slot for `peer`.
    pub fn get(&self, peer: &str) -> Option<SessionSlot> {
        self.sessions.get(peer).cloned()
    }

    /// Slot for `peer`, created empty if missing.
    pub fn slot(&mut self, peer: &str) -> SessionSlot {
        self.sessions
            .entry(peer.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Install an established session for `peer` into its locked slot.
    ///
    /// Fails if the slot already holds a session.
    pub fn put(slot: &mut Option<RatchetSession>, peer: &str, session: RatchetSession) -> Result<()> {
        if slot.is_some() {
            return Err(CryptoError::RatchetError(format!(
                "Session already exists for {peer}"
            )));
        }
        *slot = Some(session);
        Ok(())
    }
}
