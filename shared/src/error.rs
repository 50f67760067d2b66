//! Error types for session and cryptographic operations

use thiserror::Error;

/// Errors that can occur while establishing trust or running a ratchet session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Certificate signature did not verify against the authority key
    #[error("Certificate verification failed")]
    CertificateVerificationFailed,

    /// Certificate is malformed (bad username or embedded key)
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A certificate for this username is already trusted
    #[error("Duplicate certificate for {0}")]
    DuplicateCertificate(String),

    /// No trusted certificate exists for the peer
    #[error("No certificate for peer {0}")]
    NoCertificateForPeer(String),

    /// The (ratchet key, counter) pair was already accepted
    #[error("Replay detected")]
    ReplayDetected,

    /// The header asks for more skipped keys than the session allows
    #[error("Too many skipped messages: {requested} requested, limit {limit}")]
    TooManySkippedMessages {
        /// Number of message keys that would have to be derived
        requested: u32,
        /// Configured maximum skip distance
        limit: u32,
    },

    /// AEAD authentication failed (tampering or corruption)
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Header bytes could not be parsed
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Encryption failure
    #[error("Encryption error: {0}")]
    EncryptionError(String),

    /// Key derivation failure
    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),

    /// Ratchet state cannot serve the request
    #[error("Ratchet error: {0}")]
    RatchetError(String),

    /// Wire encoding or decoding failure
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Session configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
