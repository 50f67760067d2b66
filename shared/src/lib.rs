//! Custos Cryptographic Primitives
//!
//! This crate implements a Double Ratchet messenger in which every message
//! key is additionally wrapped for a single escrow authority. Peers are
//! authenticated by certificates signed by a certificate authority.

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod certificate;
pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod escrow;
pub mod header;
pub mod keys;
pub mod primitives;
pub mod ratchet;
pub mod replay;
pub mod skipped;
pub mod store;

pub use certificate::{Certificate, CertificateAuthority, CertificateVerifier};
pub use chain::{ChainKey, MessageKey};
pub use client::MessengerClient;
pub use config::SessionConfig;
pub use error::{CryptoError, Result};
pub use escrow::{wrap_message_key, EscrowAuthority, EscrowEnvelope};
pub use header::{EncryptedMessage, MessageHeader};
pub use keys::{generate_identity, KeyFingerprint, KeyPair};
pub use ratchet::{RatchetSession, SessionInfo};

pub use ed25519_dalek::{Signature, VerifyingKey};
pub use x25519_dalek::PublicKey;

use subtle::ConstantTimeEq;

/// Version of the message header format
pub const PROTOCOL_VERSION: u8 = 1;

/// Constant-time comparison of byte arrays
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
