//! Symmetric-key ratchet
//!
//! A chain key is stepped once per message. Each step yields a one-time
//! message key and replaces the chain key; nothing here can walk a chain
//! backwards.
//!
//!   mk      = HMAC(ck, "custos-v1-msg")
//!   next_ck = HMAC(ck, "custos-v1-chain")

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, Result};
use crate::primitives::{kdf_to_symmetric, CHAIN_LABEL, KEY_LEN, MESSAGE_LABEL};

/// Sending or receiving chain key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChainKey {
    key: [u8; KEY_LEN],
}

impl ChainKey {
    pub(crate) fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Derive this step's message key and the next chain key.
    pub fn advance(&self) -> Result<(MessageKey, ChainKey)> {
        let message = kdf_to_symmetric(&self.key, MESSAGE_LABEL)?;
        let next = kdf_to_symmetric(&self.key, CHAIN_LABEL)?;
        Ok((
            MessageKey { key: *message },
            ChainKey { key: *next },
        ))
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChainKey(..)")
    }
}

/// One-time AES-256-GCM key for a single message.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MessageKey {
    key: [u8; KEY_LEN],
}

impl MessageKey {
    /// Raw key bytes, as carried inside the escrow envelope.
    pub fn export_raw(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.key)
    }

    /// Rebuild a message key from exported bytes.
    pub fn import_raw(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Message key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl PartialEq for MessageKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for MessageKey {}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_advance_is_deterministic() {
        let ck = ChainKey::from_bytes([0x11; 32]);
        let (mk1, next1) = ck.advance().unwrap();
        let (mk2, next2) = ck.advance().unwrap();
        assert_eq!(mk1, mk2);
        assert_eq!(next1.key, next2.key);
    }

    #[test]
    fn test_message_key_never_equals_chain_key() {
        let ck = ChainKey::from_bytes([0x22; 32]);
        let (mk, next) = ck.advance().unwrap();
        assert_ne!(mk.key, next.key);
        assert_ne!(mk.key, ck.key);
    }

    #[test]
    fn test_each_step_yields_a_new_key() {
        let mut ck = ChainKey::from_bytes([0x33; 32]);
        let mut seen = HashSet::new();
        for _ in 0..256 {
            let (mk, next) = ck.advance().unwrap();
            assert!(seen.insert(mk.key), "message key repeated along a chain");
            assert!(seen.insert(next.key), "chain key collided with a message key");
            ck = next;
        }
    }

    #[test]
    fn test_export_import_raw() {
        let (mk, _) = ChainKey::from_bytes([0x44; 32]).advance().unwrap();
        let raw = mk.export_raw();
        assert_eq!(MessageKey::import_raw(&raw[..]).unwrap(), mk);
        assert!(matches!(
            MessageKey::import_raw(&raw[..31]),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let (mk, next) = ChainKey::from_bytes([0x55; 32]).advance().unwrap();
        assert_eq!(format!("{mk:?}"), "MessageKey(..)");
        assert_eq!(format!("{next:?}"), "ChainKey(..)");
    }
}
