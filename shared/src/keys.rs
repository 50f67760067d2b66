//! Asymmetric key pairs and public-key fingerprints
//!
//! Every asymmetric key in a session is an X25519 key pair: the long-term
//! identity key generated once per client, the short-lived ratchet keys,
//! the single-use escrow ephemerals and the escrow authority's fixed key.

use std::fmt;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// X25519 key pair.
///
/// The secret half is a `StaticSecret`, which x25519-dalek zeroizes on drop.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Rebuild a key pair from raw secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Public half as raw bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Raw secret bytes, wiped when the returned guard drops.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Fingerprint of the public half.
    pub fn fingerprint(&self) -> KeyFingerprint {
        KeyFingerprint::of(self.public.as_bytes())
    }

    /// X25519 with `their_public`.
    ///
    /// Rejects non-contributory results (low-order peer points), which would
    /// make the shared value independent of our secret.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Result<Zeroizing<[u8; 32]>> {
        let shared = self.secret.diffie_hellman(their_public);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey(
                "Non-contributory Diffie-Hellman output".into(),
            ));
        }
        Ok(Zeroizing::new(*shared.as_bytes()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Generate a new long-term identity key pair.
pub fn generate_identity() -> KeyPair {
    KeyPair::generate()
}

/// Stable fixed-width identifier of a public key: SHA-256 of its 32 raw bytes.
///
/// Skipped-key and replay lookups are keyed by this rather than by any
/// serialized form of the key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyFingerprint([u8; 32]);

impl KeyFingerprint {
    /// Fingerprint of raw public-key bytes.
    pub fn of(public_key: &[u8; 32]) -> Self {
        Self(Sha256::digest(public_key).into())
    }

    /// Fingerprint of an X25519 public key.
    pub fn of_public(public_key: &PublicKey) -> Self {
        Self::of(public_key.as_bytes())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFingerprint({})", self.short())
    }
}
