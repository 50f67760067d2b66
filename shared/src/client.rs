//! Messenger client: the public surface of the session engine
//!
//! A [`MessengerClient`] owns one identity key pair, the authority keys it
//! was configured with, a trust store of verified peers and one ratchet
//! session per peer. All operations take `&self`; operations on the same
//! peer are serialized by that peer's session lock, operations on different
//! peers run in parallel.

use std::fmt;

use ed25519_dalek::{Signature, VerifyingKey};
use parking_lot::RwLock;
use tracing::{debug, info};
use x25519_dalek::PublicKey;

use crate::certificate::{Certificate, CertificateVerifier};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::header::EncryptedMessage;
use crate::keys::{generate_identity, KeyFingerprint, KeyPair};
use crate::ratchet::{RatchetSession, SessionInfo};
use crate::store::{SessionSlot, SessionStore, TrustStore};

/// One party of the messaging protocol.
pub struct MessengerClient {
    identity: KeyPair,
    verifier: CertificateVerifier,
    escrow_public: PublicKey,
    config: SessionConfig,
    trust: RwLock<TrustStore>,
    sessions: RwLock<SessionStore>,
}

impl MessengerClient {
    /// Create a client with default session limits.
    ///
    /// `authority` verifies peer certificates; every message key is wrapped
    /// for `escrow_public`.
    pub fn new(authority: VerifyingKey, escrow_public: PublicKey) -> Self {
        Self::build(authority, escrow_public, SessionConfig::default())
    }

    /// Create a client with explicit session limits.
    pub fn with_config(
        authority: VerifyingKey,
        escrow_public: PublicKey,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(authority, escrow_public, config))
    }

    fn build(authority: VerifyingKey, escrow_public: PublicKey, config: SessionConfig) -> Self {
        let identity = generate_identity();
        debug!(identity = %identity.fingerprint().short(), "Created messenger client");
        Self {
            identity,
            verifier: CertificateVerifier::new(authority),
            escrow_public,
            config,
            trust: RwLock::new(TrustStore::default()),
            sessions: RwLock::new(SessionStore::default()),
        }
    }

    /// Certificate binding `username` to this client's identity key, to be
    /// signed by the certificate authority.
    pub fn issue_certificate(&self, username: &str) -> Result<Certificate> {
        Certificate::new(username, self.identity.public())
    }

    /// Fingerprint of this client's identity key.
    pub fn identity_fingerprint(&self) -> KeyFingerprint {
        self.identity.fingerprint()
    }

    /// Verify and trust a peer certificate.
    pub fn accept_certificate(&self, certificate: &Certificate, signature: &Signature) -> Result<()> {
        let mut trust = self.trust.write();
        let entry = trust.record(&self.verifier, certificate, signature)?;
        info!(
            peer = %entry.certificate.username,
            identity = %KeyFingerprint::of_public(&entry.public_key).short(),
            "Accepted certificate"
        );
        Ok(())
    }

    /// Whether a certificate for `peer` has been accepted.
    pub fn trusts(&self, peer: &str) -> bool {
        self.trust.read().get(peer).is_some()
    }

    /// Encrypt `plaintext` for `peer`, starting a session as initiator if
    /// none exists.
    pub fn encrypt_message(&self, peer: &str, plaintext: &[u8]) -> Result<EncryptedMessage> {
        let peer_key = self.trust.read().public_key(peer)?;
        let slot = self.slot(peer);
        let mut guard = slot.lock();

        let message = match guard.as_mut() {
            Some(session) => session.encrypt(plaintext, &self.escrow_public)?,
            None => {
                let mut session = RatchetSession::initiator(&self.identity, &peer_key, self.config)?;
                let message = session.encrypt(plaintext, &self.escrow_public)?;
                SessionStore::put(&mut guard, peer, session)?;
                info!(peer, "Started session as initiator");
                message
            }
        };

        debug!(peer, counter = message.header.counter, "Encrypted message");
        Ok(message)
    }

    /// Decrypt a message from `peer`, starting a session as responder if
    /// none exists.
    pub fn decrypt_message(&self, peer: &str, message: &EncryptedMessage) -> Result<Vec<u8>> {
        let peer_key = self.trust.read().public_key(peer)?;
        let slot = self.slot(peer);
        let mut guard = slot.lock();

        let plaintext = match guard.as_mut() {
            Some(session) => session.decrypt(message)?,
            None => {
                let mut session = RatchetSession::responder(&self.identity, &peer_key, self.config)?;
                let plaintext = session.decrypt(message)?;
                SessionStore::put(&mut guard, peer, session)?;
                info!(peer, "Started session as responder");
                plaintext
            }
        };

        debug!(peer, counter = message.header.counter, "Decrypted message");
        Ok(plaintext)
    }

    /// Bookkeeping snapshot of the session with `peer`, if established.
    pub fn session_info(&self, peer: &str) -> Option<SessionInfo> {
        let slot = self.sessions.read().get(peer)?;
        let guard = slot.lock();
        guard.as_ref().map(RatchetSession::info)
    }

    fn slot(&self, peer: &str) -> SessionSlot {
        if let Some(slot) = self.sessions.read().get(peer) {
            return slot;
        }
        self.sessions.write().slot(peer)
    }
}

impl fmt::Debug for MessengerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessengerClient")
            .field("identity", &self.identity.fingerprint())
            .field("escrow", &KeyFingerprint::of_public(&self.escrow_public))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateAuthority;
    use crate::error::CryptoError;
    use crate::escrow::EscrowAuthority;

    fn client(ca: &CertificateAuthority, escrow: &EscrowAuthority) -> MessengerClient {
        MessengerClient::new(ca.verifying_key(), escrow.public_key())
    }

    #[test]
    fn test_unknown_peer_rejected() {
        let ca = CertificateAuthority::generate();
        let escrow = EscrowAuthority::generate();
        let alice = client(&ca, &escrow);

        assert_eq!(
            alice.encrypt_message("bob", b"hi").map(|_| ()),
            Err(CryptoError::NoCertificateForPeer("bob".to_string()))
        );
        assert!(alice.session_info("bob").is_none());
    }

    #[test]
    fn test_issue_certificate_uses_identity_key() {
        let ca = CertificateAuthority::generate();
        let escrow = EscrowAuthority::generate();
        let alice = client(&ca, &escrow);

        let cert = alice.issue_certificate("alice").unwrap();
        assert_eq!(KeyFingerprint::of(&cert.public_key), alice.identity_fingerprint());
        assert_eq!(alice.issue_certificate("alice").unwrap(), cert);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let ca = CertificateAuthority::generate();
        let escrow = EscrowAuthority::generate();
        let config = SessionConfig {
            max_skip: 0,
            ..SessionConfig::default()
        };
        assert!(MessengerClient::with_config(ca.verifying_key(), escrow.public_key(), config).is_err());
    }

    #[test]
    fn test_session_created_only_after_success() {
        let ca = CertificateAuthority::generate();
        let escrow = EscrowAuthority::generate();
        let alice = client(&ca, &escrow);
        let bob = client(&ca, &escrow);

        let alice_cert = alice.issue_certificate("alice").unwrap();
        let bob_cert = bob.issue_certificate("bob").unwrap();
        alice.accept_certificate(&bob_cert, &ca.sign(&bob_cert).unwrap()).unwrap();
        bob.accept_certificate(&alice_cert, &ca.sign(&alice_cert).unwrap()).unwrap();

        let msg = alice.encrypt_message("bob", b"hello").unwrap();
        let mut tampered = msg.clone();
        tampered.ciphertext[0] ^= 1;

        assert_eq!(bob.decrypt_message("alice", &tampered), Err(CryptoError::DecryptionFailed));
        assert!(bob.session_info("alice").is_none());
        assert_eq!(bob.decrypt_message("alice", &msg).unwrap(), b"hello");
        assert!(bob.session_info("alice").unwrap().can_send);
    }
}
