//! Double Ratchet session
//!
//! One [`RatchetSession`] exists per peer. It combines the symmetric chains
//! of [`crate::chain`] with a Diffie-Hellman ratchet over X25519, caches
//! keys for skipped counters, rejects replays and wraps every outbound
//! message key for the escrow authority.
//!
//! ## Bootstrap
//!
//! Both sides compute `SK = DH(own identity, peer identity)`.
//!
//! - The initiator generates a ratchet key pair `DHs`, sets `DHr` to the
//!   peer's identity key and derives `(RK, CKs) = KDF(SK, DH(DHs, DHr))`.
//! - The responder uses its identity key pair as `DHs` and sets `RK = SK`.
//!   The first inbound header then triggers a DH ratchet step.
//!
//! ## Atomicity
//!
//! Every fallible step of [`RatchetSession::decrypt`] runs against a copy of
//! the ratchet state and a pending list of skipped keys. The copy, the
//! pending keys and the replay record are committed only once the payload
//! authenticates, so a rejected message leaves the session untouched.

use std::fmt;

use tracing::{debug, warn};
use x25519_dalek::PublicKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chain::{ChainKey, MessageKey};
use crate::config::SessionConfig;
use crate::error::{CryptoError, Result};
use crate::escrow::wrap_message_key;
use crate::header::{EncryptedMessage, MessageHeader};
use crate::keys::{KeyFingerprint, KeyPair};
use crate::primitives::{aead_decrypt, aead_encrypt, kdf_split, random_nonce, KEY_LEN, ROOT_LABEL};
use crate::replay::ReplayGuard;
use crate::skipped::SkippedKeys;

// ───────────────────────────── types ───────────────────────────────

/// Root key, only ever fed back into the root KDF.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct RootKey {
    key: [u8; KEY_LEN],
}

/// Skipped keys derived during a decrypt, held back until it succeeds.
type PendingKeys = Vec<(KeyFingerprint, u32, MessageKey)>;

/// Keys and counters; everything a decrypt may have to roll back.
#[derive(Clone)]
struct RatchetState {
    /// Our current ratchet key pair (DHs).
    dh_self: KeyPair,
    /// Peer's current ratchet public key (DHr).
    dh_remote: Option<PublicKey>,
    root_key: RootKey,
    send_chain: Option<ChainKey>,
    recv_chain: Option<ChainKey>,
    /// Ns
    send_count: u32,
    /// Nr
    recv_count: u32,
    /// PN
    previous_chain_length: u32,
}

/// Snapshot of a session's public bookkeeping. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Fingerprint of our current ratchet public key.
    pub local_ratchet: KeyFingerprint,
    /// Fingerprint of the peer's current ratchet public key.
    pub remote_ratchet: Option<KeyFingerprint>,
    /// Messages sent on the current sending chain.
    pub send_count: u32,
    /// Messages received on the current receiving chain.
    pub recv_count: u32,
    /// Length of our previous sending chain.
    pub previous_chain_length: u32,
    /// Cached skipped message keys.
    pub skipped_keys: usize,
    /// Messages accepted over the session's lifetime.
    pub received: usize,
    /// Whether a sending chain exists.
    pub can_send: bool,
}

/// Double Ratchet state for one peer.
pub struct RatchetSession {
    state: RatchetState,
    skipped: SkippedKeys,
    replay: ReplayGuard,
    config: SessionConfig,
}

// ───────────────── Ratchet session ─────────────────────────────────

impl RatchetSession {
    // ─────────────── initialisation ────────────────────────────────

    /// Start a session as the party that sends first.
    pub fn initiator(
        identity: &KeyPair,
        peer_identity: &PublicKey,
        config: SessionConfig,
    ) -> Result<Self> {
        let shared_secret = identity.diffie_hellman(peer_identity)?;

        let dh_self = KeyPair::generate();
        let dh_output = dh_self.diffie_hellman(peer_identity)?;
        let (root_key, send_chain) = kdf_split(&shared_secret, &dh_output[..], ROOT_LABEL)?;

        debug!(ratchet = %dh_self.fingerprint().short(), "Initialised initiator session");

        Ok(Self::with_state(
            RatchetState {
                dh_self,
                dh_remote: Some(*peer_identity),
                root_key: RootKey { key: *root_key },
                send_chain: Some(ChainKey::from_bytes(*send_chain)),
                recv_chain: None,
                send_count: 0,
                recv_count: 0,
                previous_chain_length: 0,
            },
            config,
        ))
    }

    /// Start a session as the party that receives first.
    ///
    /// There is no sending chain until the first inbound message has been
    /// decrypted.
    pub fn responder(
        identity: &KeyPair,
        peer_identity: &PublicKey,
        config: SessionConfig,
    ) -> Result<Self> {
        let shared_secret = identity.diffie_hellman(peer_identity)?;

        debug!(ratchet = %identity.fingerprint().short(), "Initialised responder session");

        Ok(Self::with_state(
            RatchetState {
                dh_self: identity.clone(),
                dh_remote: None,
                root_key: RootKey {
                    key: *shared_secret,
                },
                send_chain: None,
                recv_chain: None,
                send_count: 0,
                recv_count: 0,
                previous_chain_length: 0,
            },
            config,
        ))
    }

    fn with_state(state: RatchetState, config: SessionConfig) -> Self {
        Self {
            state,
            skipped: SkippedKeys::new(config.max_cached_keys),
            replay: ReplayGuard::default(),
            config,
        }
    }

    // ────────────────── encrypt ────────────────────────────────────

    /// Encrypt `plaintext`, wrapping its message key for `escrow_public`.
    ///
    /// The sending chain and counter advance only if every step succeeds.
    pub fn encrypt(&mut self, plaintext: &[u8], escrow_public: &PublicKey) -> Result<EncryptedMessage> {
        let chain = self
            .state
            .send_chain
            .as_ref()
            .ok_or_else(|| CryptoError::RatchetError("No sending chain".into()))?;
        let (message_key, next_chain) = chain.advance()?;
        let next_count = self
            .state
            .send_count
            .checked_add(1)
            .ok_or_else(|| CryptoError::RatchetError("Sending counter exhausted".into()))?;

        let escrow = wrap_message_key(escrow_public, &message_key)?;
        let header = MessageHeader {
            ratchet_public: self.state.dh_self.public_bytes(),
            previous_chain_length: self.state.previous_chain_length,
            counter: self.state.send_count,
            escrow_ephemeral_public: escrow.ephemeral_public,
            escrow_ciphertext: escrow.ciphertext,
            escrow_nonce: escrow.nonce,
            message_nonce: random_nonce(),
        };
        let associated_data = header.to_bytes()?;
        let ciphertext = aead_encrypt(
            message_key.as_bytes(),
            plaintext,
            &header.message_nonce,
            &associated_data,
        )?;

        self.state.send_chain = Some(next_chain);
        self.state.send_count = next_count;

        Ok(EncryptedMessage { header, ciphertext })
    }

    // ────────────────── decrypt ────────────────────────────────────

    /// Decrypt an incoming message.
    ///
    /// On any error the session is left exactly as it was.
    pub fn decrypt(&mut self, message: &EncryptedMessage) -> Result<Vec<u8>> {
        let header = &message.header;
        let ratchet = header.ratchet_fingerprint();

        // 1. Known replays fail before any key work.
        if let Err(e) = self.replay.check(&ratchet, header.counter) {
            warn!(ratchet = %ratchet.short(), counter = header.counter, "Replay rejected");
            return Err(e);
        }
        // A header that cannot be re-encoded cannot authenticate.
        let associated_data = header
            .to_bytes()
            .map_err(|_| CryptoError::DecryptionFailed)?;

        // 2. Out-of-order delivery on a chain we have already skipped past.
        if let Some(key) = self.skipped.get(&ratchet, header.counter) {
            let plaintext = open(key, message, &associated_data)?;
            self.skipped.take(&ratchet, header.counter);
            self.replay.record(ratchet, header.counter);
            debug!(ratchet = %ratchet.short(), counter = header.counter, "Decrypted with skipped key");
            return Ok(plaintext);
        }

        // 3. Ratchet forward on a scratch copy.
        let mut state = self.state.clone();
        let mut pending = PendingKeys::new();
        if state.needs_dh_ratchet(&header.ratchet_public) {
            state.skip_to(header.previous_chain_length, self.config.max_skip, &mut pending)?;
            // Low-order points from a forged header fail like any forgery.
            state
                .dh_ratchet(PublicKey::from(header.ratchet_public))
                .map_err(|_| CryptoError::DecryptionFailed)?;
        }
        state.skip_to(header.counter, self.config.max_skip, &mut pending)?;
        let message_key = state.next_receiving_key()?;

        let plaintext = open(&message_key, message, &associated_data)?;

        // 4. Authenticated: commit.
        self.state = state;
        for (ratchet_fp, counter, key) in pending {
            self.skipped.insert(ratchet_fp, counter, key);
        }
        self.replay.record(ratchet, header.counter);
        Ok(plaintext)
    }

    // ─────────── public accessors ──────────────────────────────────

    /// Our current ratchet public key (sent in message headers).
    pub fn ratchet_public(&self) -> PublicKey {
        *self.state.dh_self.public()
    }

    /// Whether this session can encrypt.
    pub fn can_send(&self) -> bool {
        self.state.send_chain.is_some()
    }

    /// Bookkeeping snapshot.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            local_ratchet: self.state.dh_self.fingerprint(),
            remote_ratchet: self.state.dh_remote.as_ref().map(KeyFingerprint::of_public),
            send_count: self.state.send_count,
            recv_count: self.state.recv_count,
            previous_chain_length: self.state.previous_chain_length,
            skipped_keys: self.skipped.len(),
            received: self.replay.len(),
            can_send: self.can_send(),
        }
    }
}

impl fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatchetSession")
            .field("info", &self.info())
            .finish_non_exhaustive()
    }
}

fn open(key: &MessageKey, message: &EncryptedMessage, associated_data: &[u8]) -> Result<Vec<u8>> {
    aead_decrypt(
        key.as_bytes(),
        &message.ciphertext,
        &message.header.message_nonce,
        associated_data,
    )
    .map_err(|e| {
        warn!(
            ratchet = %message.header.ratchet_fingerprint().short(),
            counter = message.header.counter,
            "Message failed authentication"
        );
        e
    })
}

// ─────────────── ratchet steps ─────────────────────────────────────

impl RatchetState {
    fn needs_dh_ratchet(&self, ratchet_public: &[u8; 32]) -> bool {
        match self.dh_remote {
            Some(ref current) => !crate::constant_time_eq(current.as_bytes(), ratchet_public),
            None => true,
        }
    }

    /// Advance the receiving chain to `until`, collecting skipped keys.
    ///
    /// The distance is checked before anything else; with no receiving
    /// chain there is nothing to skip.
    fn skip_to(&mut self, until: u32, max_skip: u32, pending: &mut PendingKeys) -> Result<()> {
        let requested = until.saturating_sub(self.recv_count);
        if requested > max_skip {
            warn!(requested, limit = max_skip, "Skip distance exceeds limit");
            return Err(CryptoError::TooManySkippedMessages {
                requested,
                limit: max_skip,
            });
        }
        let (Some(mut chain), Some(remote)) = (self.recv_chain.clone(), self.dh_remote) else {
            return Ok(());
        };
        if requested == 0 {
            return Ok(());
        }

        let remote = KeyFingerprint::of_public(&remote);
        while self.recv_count < until {
            let (message_key, next_chain) = chain.advance()?;
            pending.push((remote, self.recv_count, message_key));
            chain = next_chain;
            self.recv_count += 1;
        }
        self.recv_chain = Some(chain);

        debug!(ratchet = %remote.short(), skipped = requested, "Stored skipped message keys");
        Ok(())
    }

    /// DH ratchet step on receipt of a new peer ratchet key.
    fn dh_ratchet(&mut self, their_new_public: PublicKey) -> Result<()> {
        self.previous_chain_length = self.send_count;
        self.send_count = 0;
        self.recv_count = 0;
        self.dh_remote = Some(their_new_public);

        // DH with our current key and their new key → receiving chain
        let dh_output = self.dh_self.diffie_hellman(&their_new_public)?;
        let (root_key, recv_chain) = kdf_split(&self.root_key.key, &dh_output[..], ROOT_LABEL)?;
        self.root_key = RootKey { key: *root_key };
        self.recv_chain = Some(ChainKey::from_bytes(*recv_chain));

        // Fresh key pair, DH with their key → sending chain
        self.dh_self = KeyPair::generate();
        let dh_output = self.dh_self.diffie_hellman(&their_new_public)?;
        let (root_key, send_chain) = kdf_split(&self.root_key.key, &dh_output[..], ROOT_LABEL)?;
        self.root_key = RootKey { key: *root_key };
        self.send_chain = Some(ChainKey::from_bytes(*send_chain));

        debug!(
            remote = %KeyFingerprint::of_public(&their_new_public).short(),
            local = %self.dh_self.fingerprint().short(),
            previous_chain_length = self.previous_chain_length,
            "DH ratchet step"
        );
        Ok(())
    }

    /// Derive the key for the next receiving counter.
    ///
    /// A header that names the current remote key while no receiving chain
    /// exists is unauthenticated input, so it fails like any forgery.
    fn next_receiving_key(&mut self) -> Result<MessageKey> {
        let chain = self.recv_chain.as_ref().ok_or_else(|| {
            warn!("Message on a chain that was never established");
            CryptoError::DecryptionFailed
        })?;
        let (message_key, next_chain) = chain.advance()?;
        self.recv_count = self
            .recv_count
            .checked_add(1)
            .ok_or_else(|| CryptoError::RatchetError("Receiving counter exhausted".into()))?;
        self.recv_chain = Some(next_chain);
        Ok(message_key)
    }
}

// ────────────────────── tests ──────────────────────────────────────
