//! Per-message key escrow
//!
//! Every outbound message key is wrapped for a fixed escrow authority:
//!
//!   eph        = fresh X25519 key pair (single use)
//!   shared     = DH(eph.secret, escrow_public)
//!   wrap_key   = HMAC(shared, "custos-v1-escrow")
//!   escrow_ct  = AES-256-GCM(wrap_key, nonce, mk, aad = "")
//!
//! The header carries `eph.public`, `escrow_ct` and `nonce`. The authority
//! recomputes `shared` from its secret and `eph.public` without taking part
//! in the session.

use std::fmt;

use x25519_dalek::PublicKey;

use crate::chain::MessageKey;
use crate::error::Result;
use crate::header::{EncryptedMessage, MessageHeader};
use crate::keys::{KeyFingerprint, KeyPair};
use crate::primitives::{
    aead_decrypt, aead_encrypt, kdf_to_symmetric, random_nonce, ESCROW_LABEL, NONCE_LEN,
};

/// Escrow fields of a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowEnvelope {
    /// Ephemeral public key.
    pub ephemeral_public: [u8; 32],
    /// Wrapped message key.
    pub ciphertext: Vec<u8>,
    /// Nonce used for `ciphertext`.
    pub nonce: [u8; NONCE_LEN],
}

/// Wrap `message_key` for the escrow authority holding `escrow_public`.
pub fn wrap_message_key(escrow_public: &PublicKey, message_key: &MessageKey) -> Result<EscrowEnvelope> {
    let ephemeral = KeyPair::generate();
    let shared = ephemeral.diffie_hellman(escrow_public)?;
    let wrap_key = kdf_to_symmetric(&shared, ESCROW_LABEL)?;
    let nonce = random_nonce();
    let ciphertext = aead_encrypt(&wrap_key, &message_key.export_raw()[..], &nonce, &[])?;

    Ok(EscrowEnvelope {
        ephemeral_public: ephemeral.public_bytes(),
        ciphertext,
        nonce,
    })
}

/// The escrow authority: holder of the fixed escrow private key.
pub struct EscrowAuthority {
    key_pair: KeyPair,
}

impl EscrowAuthority {
    /// Generate a new escrow key pair.
    pub fn generate() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Load from raw secret bytes (the operator's key file).
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            key_pair: KeyPair::from_secret_bytes(bytes),
        }
    }

    /// Raw secret bytes, for writing the operator's key file.
    pub fn secret_bytes(&self) -> zeroize::Zeroizing<[u8; 32]> {
        self.key_pair.secret_bytes()
    }

    /// Public key every client wraps message keys for.
    pub fn public_key(&self) -> PublicKey {
        *self.key_pair.public()
    }

    /// Fingerprint of the escrow public key.
    pub fn fingerprint(&self) -> KeyFingerprint {
        self.key_pair.fingerprint()
    }

    /// Recover the message key wrapped in `header`.
    pub fn recover_message_key(&self, header: &MessageHeader) -> Result<MessageKey> {
        let ephemeral = PublicKey::from(header.escrow_ephemeral_public);
        let shared = self.key_pair.diffie_hellman(&ephemeral)?;
        let wrap_key = kdf_to_symmetric(&shared, ESCROW_LABEL)?;
        let raw = zeroize::Zeroizing::new(aead_decrypt(
            &wrap_key,
            &header.escrow_ciphertext,
            &header.escrow_nonce,
            &[],
        )?);
        MessageKey::import_raw(&raw)
    }

    /// Recover the plaintext of an intercepted message.
    pub fn decrypt_message(&self, message: &EncryptedMessage) -> Result<Vec<u8>> {
        let message_key = self.recover_message_key(&message.header)?;
        let associated_data = message.header.to_bytes()?;
        aead_decrypt(
            message_key.as_bytes(),
            &message.ciphertext,
            &message.header.message_nonce,
            &associated_data,
        )
    }
}

impl fmt::Debug for EscrowAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscrowAuthority")
            .field("public", &self.fingerprint())
            .finish_non_exhaustive()
    }
}
