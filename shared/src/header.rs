//! Message header and wire envelope
//!
//! ## Header layout
//!
//! The header travels in the clear and is bound to the payload as AEAD
//! associated data. Its canonical encoding is:
//!
//! ```text
//! [1 byte:  version]
//! [32 bytes: sender ratchet public key]
//! [4 bytes: previous chain length (u32 BE)]
//! [4 bytes: counter (u32 BE)]
//! [32 bytes: escrow ephemeral public key]
//! [12 bytes: escrow nonce]
//! [2 bytes: escrow ciphertext length (u16 BE)]
//! [N bytes: escrow ciphertext]
//! [12 bytes: payload nonce]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};
use crate::keys::KeyFingerprint;
use crate::primitives::NONCE_LEN;
use crate::PROTOCOL_VERSION;

const FIXED_LEN: usize = 1 + 32 + 4 + 4 + 32 + NONCE_LEN + 2 + NONCE_LEN;

/// Header sent alongside each ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Sender's current ratchet public key.
    pub ratchet_public: [u8; 32],
    /// Length of the sender's previous sending chain.
    pub previous_chain_length: u32,
    /// Index of this message in the current sending chain.
    pub counter: u32,
    /// Single-use public key for the escrow key exchange.
    pub escrow_ephemeral_public: [u8; 32],
    /// Message key encrypted for the escrow authority.
    pub escrow_ciphertext: Vec<u8>,
    /// Nonce for `escrow_ciphertext`.
    pub escrow_nonce: [u8; NONCE_LEN],
    /// Nonce for the payload ciphertext.
    pub message_nonce: [u8; NONCE_LEN],
}

impl MessageHeader {
    /// Canonical encoding, used as associated data.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let escrow_len = u16::try_from(self.escrow_ciphertext.len()).map_err(|_| {
            CryptoError::InvalidHeader("Escrow ciphertext too long".to_string())
        })?;

        let mut buf = Vec::with_capacity(FIXED_LEN + self.escrow_ciphertext.len());
        buf.push(PROTOCOL_VERSION);
        buf.extend_from_slice(&self.ratchet_public);
        buf.extend_from_slice(&self.previous_chain_length.to_be_bytes());
        buf.extend_from_slice(&self.counter.to_be_bytes());
        buf.extend_from_slice(&self.escrow_ephemeral_public);
        buf.extend_from_slice(&self.escrow_nonce);
        buf.extend_from_slice(&escrow_len.to_be_bytes());
        buf.extend_from_slice(&self.escrow_ciphertext);
        buf.extend_from_slice(&self.message_nonce);
        Ok(buf)
    }

    /// Parse the canonical encoding. Rejects truncated or trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes, pos: 0 };

        let version = reader.take::<1>()?[0];
        if version != PROTOCOL_VERSION {
            return Err(CryptoError::InvalidHeader(format!(
                "Unsupported version {version}"
            )));
        }
        let ratchet_public = reader.take::<32>()?;
        let previous_chain_length = u32::from_be_bytes(reader.take::<4>()?);
        let counter = u32::from_be_bytes(reader.take::<4>()?);
        let escrow_ephemeral_public = reader.take::<32>()?;
        let escrow_nonce = reader.take::<NONCE_LEN>()?;
        let escrow_len = usize::from(u16::from_be_bytes(reader.take::<2>()?));
        let escrow_ciphertext = reader.take_slice(escrow_len)?.to_vec();
        let message_nonce = reader.take::<NONCE_LEN>()?;

        if reader.pos != bytes.len() {
            return Err(CryptoError::InvalidHeader("Trailing bytes".to_string()));
        }

        Ok(Self {
            ratchet_public,
            previous_chain_length,
            counter,
            escrow_ephemeral_public,
            escrow_ciphertext,
            escrow_nonce,
            message_nonce,
        })
    }

    /// Fingerprint of the sender's ratchet key.
    pub fn ratchet_fingerprint(&self) -> KeyFingerprint {
        KeyFingerprint::of(&self.ratchet_public)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| CryptoError::InvalidHeader("Header truncated".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

/// A header plus its payload ciphertext, as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Authenticated header.
    pub header: MessageHeader,
    /// AES-256-GCM ciphertext and tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    /// Encode to MessagePack.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self)
            .map_err(|e| CryptoError::SerializationError(format!("Serialization failed: {e}")))
    }

    /// Decode from MessagePack.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| CryptoError::SerializationError(format!("Deserialization failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageHeader {
        MessageHeader {
            ratchet_public: [0xAB; 32],
            previous_chain_length: 7,
            counter: 42,
            escrow_ephemeral_public: [0xCD; 32],
            escrow_ciphertext: vec![0xEE; 48],
            escrow_nonce: [0x01; NONCE_LEN],
            message_nonce: [0x02; NONCE_LEN],
        }
    }

    #[test]
    fn test_header_serialization() {
        let hdr = sample();
        let bytes = hdr.to_bytes().unwrap();
        assert_eq!(bytes.len(), FIXED_LEN + 48);
        assert_eq!(MessageHeader::from_bytes(&bytes).unwrap(), hdr);
    }

    #[test]
    fn test_every_field_changes_encoding() {
        let base = sample().to_bytes().unwrap();

        let mut h = sample();
        h.previous_chain_length += 1;
        assert_ne!(h.to_bytes().unwrap(), base);

        let mut h = sample();
        h.counter += 1;
        assert_ne!(h.to_bytes().unwrap(), base);

        let mut h = sample();
        h.escrow_ciphertext[0] ^= 1;
        assert_ne!(h.to_bytes().unwrap(), base);

        let mut h = sample();
        h.message_nonce[11] ^= 1;
        assert_ne!(h.to_bytes().unwrap(), base);
    }

    #[test]
    fn test_truncated_and_trailing_rejected() {
        let bytes = sample().to_bytes().unwrap();
        for len in [0, 1, 33, FIXED_LEN, bytes.len() - 1] {
            assert!(matches!(
                MessageHeader::from_bytes(&bytes[..len]),
                Err(CryptoError::InvalidHeader(_))
            ));
        }

        let mut long = bytes.clone();
        long.push(0);
        assert!(MessageHeader::from_bytes(&long).is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = PROTOCOL_VERSION.wrapping_add(1);
        assert!(matches!(
            MessageHeader::from_bytes(&bytes),
            Err(CryptoError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_wire_envelope() {
        let msg = EncryptedMessage {
            header: sample(),
            ciphertext: vec![0x10; 64],
        };
        let wire = msg.to_wire().unwrap();
        assert_eq!(EncryptedMessage::from_wire(&wire).unwrap(), msg);
        assert!(matches!(
            EncryptedMessage::from_wire(&wire[..wire.len() / 2]),
            Err(CryptoError::SerializationError(_))
        ));
    }
}
