//! Symmetric primitives: key derivation and AES-256-GCM
//!
//! Thin wrappers that pin down the exact constructions used by the ratchet
//! and the escrow wrapper. Asymmetric operations live in [`crate::keys`].

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Type alias for HMAC-SHA256
pub type HmacSha256 = Hmac<Sha256>;

/// Length of every symmetric key in the protocol.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Root-key ratchet label.
pub const ROOT_LABEL: &[u8] = b"custos-v1-ratchet";

/// Chain key → message key label.
pub const MESSAGE_LABEL: &[u8] = b"custos-v1-msg";

/// Chain key → next chain key label.
pub const CHAIN_LABEL: &[u8] = b"custos-v1-chain";

/// Escrow shared value → wrapping key label.
pub const ESCROW_LABEL: &[u8] = b"custos-v1-escrow";

/// Derive two independent keys from `input_key` and `extra` entropy.
///
///   PRK = HMAC(input_key, extra)
///   A   = HMAC(PRK, label || 0x01)
///   B   = HMAC(PRK, label || 0x02)
pub fn kdf_split(
    input_key: &[u8; KEY_LEN],
    extra: &[u8],
    label: &[u8],
) -> Result<(Zeroizing<[u8; KEY_LEN]>, Zeroizing<[u8; KEY_LEN]>)> {
    let mut mac = new_mac(input_key)?;
    mac.update(extra);
    let prk = Zeroizing::new(<[u8; KEY_LEN]>::from(mac.finalize().into_bytes()));

    let mut mac = new_mac(&prk[..])?;
    mac.update(label);
    mac.update(&[0x01]);
    let first = Zeroizing::new(<[u8; KEY_LEN]>::from(mac.finalize().into_bytes()));

    let mut mac = new_mac(&prk[..])?;
    mac.update(label);
    mac.update(&[0x02]);
    let second = Zeroizing::new(<[u8; KEY_LEN]>::from(mac.finalize().into_bytes()));

    Ok((first, second))
}

/// Derive a single key: HMAC(key, label).
pub fn kdf_to_symmetric(key: &[u8; KEY_LEN], label: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let mut mac = new_mac(key)?;
    mac.update(label);
    Ok(Zeroizing::new(mac.finalize().into_bytes().into()))
}

fn new_mac(key: &[u8]) -> Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))
}

/// Fresh random AES-GCM nonce.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// AES-256-GCM encrypt. Output is ciphertext || tag.
pub fn aead_encrypt(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    nonce: &[u8; NONCE_LEN],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|e| CryptoError::EncryptionError(e.to_string()))
}

/// AES-256-GCM decrypt. Any authentication failure is [`CryptoError::DecryptionFailed`].
pub fn aead_decrypt(
    key: &[u8; KEY_LEN],
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_split_outputs_differ() {
        let (a, b) = kdf_split(&[7u8; 32], b"extra", ROOT_LABEL).unwrap();
        assert_ne!(*a, *b);

        let (a2, b2) = kdf_split(&[7u8; 32], b"extra", ROOT_LABEL).unwrap();
        assert_eq!(*a, *a2);
        assert_eq!(*b, *b2);

        let (a3, _) = kdf_split(&[7u8; 32], b"other", ROOT_LABEL).unwrap();
        assert_ne!(*a, *a3);
    }

    #[test]
    fn test_labels_separate_domains() {
        let key = [3u8; 32];
        let msg = kdf_to_symmetric(&key, MESSAGE_LABEL).unwrap();
        let chain = kdf_to_symmetric(&key, CHAIN_LABEL).unwrap();
        let escrow = kdf_to_symmetric(&key, ESCROW_LABEL).unwrap();
        assert_ne!(*msg, *chain);
        assert_ne!(*msg, *escrow);
        assert_ne!(*chain, *escrow);
    }

    #[test]
    fn test_aead_roundtrip_and_aad_binding() {
        let key = [9u8; 32];
        let nonce = random_nonce();
        let ct = aead_encrypt(&key, b"payload", &nonce, b"header").unwrap();
        assert_eq!(ct.len(), b"payload".len() + TAG_LEN);

        let pt = aead_decrypt(&key, &ct, &nonce, b"header").unwrap();
        assert_eq!(pt, b"payload");

        assert_eq!(
            aead_decrypt(&key, &ct, &nonce, b"headex"),
            Err(CryptoError::DecryptionFailed)
        );
        assert_eq!(
            aead_decrypt(&[8u8; 32], &ct, &nonce, b"header"),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_nonces_are_fresh() {
        assert_ne!(random_nonce(), random_nonce());
    }
}
