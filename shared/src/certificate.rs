//! Certificates binding a username to an identity public key
//!
//! A certificate authority signs the canonical encoding
//!
//! ```text
//! "custos-cert-v1" || u16 BE username length || username || public key (32)
//! ```
//!
//! and every client checks that signature against the authority's fixed
//! verifying key before trusting the embedded key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey;

use crate::error::{CryptoError, Result};

const CERT_DOMAIN: &[u8] = b"custos-cert-v1";

/// Longest accepted username, in bytes.
pub const MAX_USERNAME_LEN: usize = 255;

/// Unsigned `{username, public key}` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Owner of the key.
    pub username: String,
    /// Owner's X25519 identity public key.
    pub public_key: [u8; 32],
}

impl Certificate {
    /// Build a certificate for `username`.
    pub fn new(username: impl Into<String>, public_key: &PublicKey) -> Result<Self> {
        let cert = Self {
            username: username.into(),
            public_key: *public_key.as_bytes(),
        };
        cert.validate()?;
        Ok(cert)
    }

    fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(CryptoError::InvalidCertificate("Empty username".to_string()));
        }
        if self.username.len() > MAX_USERNAME_LEN {
            return Err(CryptoError::InvalidCertificate(format!(
                "Username longer than {MAX_USERNAME_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// Canonical encoding covered by the authority signature.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let name = self.username.as_bytes();
        let mut buf = Vec::with_capacity(CERT_DOMAIN.len() + 2 + name.len() + 32);
        buf.extend_from_slice(CERT_DOMAIN);
        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buf.extend_from_slice(name);
        buf.extend_from_slice(&self.public_key);
        Ok(buf)
    }

    /// Embedded identity key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.public_key)
    }
}

/// Issuer of certificate signatures (the registration service's role).
pub struct CertificateAuthority {
    signing: SigningKey,
}

impl CertificateAuthority {
    /// Generate a new authority key.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Key clients pin to verify certificates.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Sign a certificate.
    pub fn sign(&self, certificate: &Certificate) -> Result<Signature> {
        Ok(self.signing.sign(&certificate.to_bytes()?))
    }
}

/// Checks certificates against a fixed authority key.
#[derive(Debug, Clone)]
pub struct CertificateVerifier {
    authority: VerifyingKey,
}

impl CertificateVerifier {
    /// Trust certificates signed by `authority`.
    pub fn new(authority: VerifyingKey) -> Self {
        Self { authority }
    }

    /// Verify `signature` over `certificate` and return the embedded key.
    pub fn verify(&self, certificate: &Certificate, signature: &Signature) -> Result<PublicKey> {
        let message = certificate.to_bytes()?;
        self.authority
            .verify(&message, signature)
            .map_err(|_| CryptoError::CertificateVerificationFailed)?;
        Ok(certificate.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    #[test]
    fn test_sign_verify() {
        let ca = CertificateAuthority::generate();
        let verifier = CertificateVerifier::new(ca.verifying_key());
        let key = KeyPair::generate();

        let cert = Certificate::new("alice", key.public()).unwrap();
        let signature = ca.sign(&cert).unwrap();
        assert_eq!(verifier.verify(&cert, &signature).unwrap(), *key.public());
    }

    #[test]
    fn test_altered_certificate_rejected() {
        let ca = CertificateAuthority::generate();
        let verifier = CertificateVerifier::new(ca.verifying_key());
        let cert = Certificate::new("alice", KeyPair::generate().public()).unwrap();
        let signature = ca.sign(&cert).unwrap();

        let mut renamed = cert.clone();
        renamed.username = "mallory".to_string();
        assert_eq!(
            verifier.verify(&renamed, &signature),
            Err(CryptoError::CertificateVerificationFailed)
        );

        let mut rekeyed = cert.clone();
        rekeyed.public_key = KeyPair::generate().public_bytes();
        assert_eq!(
            verifier.verify(&rekeyed, &signature),
            Err(CryptoError::CertificateVerificationFailed)
        );
    }

    #[test]
    fn test_foreign_authority_rejected() {
        let ca = CertificateAuthority::generate();
        let rogue = CertificateAuthority::generate();
        let verifier = CertificateVerifier::new(ca.verifying_key());

        let cert = Certificate::new("alice", KeyPair::generate().public()).unwrap();
        let signature = rogue.sign(&cert).unwrap();
        assert_eq!(
            verifier.verify(&cert, &signature),
            Err(CryptoError::CertificateVerificationFailed)
        );
    }

    #[test]
    fn test_username_bounds() {
        let key = KeyPair::generate();
        assert!(matches!(
            Certificate::new("", key.public()),
            Err(CryptoError::InvalidCertificate(_))
        ));
        assert!(Certificate::new("a".repeat(MAX_USERNAME_LEN), key.public()).is_ok());
        assert!(Certificate::new("a".repeat(MAX_USERNAME_LEN + 1), key.public()).is_err());
    }

    #[test]
    fn test_encoding_is_unambiguous() {
        let key = KeyPair::generate();
        let a = Certificate::new("ab", key.public()).unwrap();
        let b = Certificate::new("a", key.public()).unwrap();
        assert_ne!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
        assert!(a.to_bytes().unwrap().starts_with(CERT_DOMAIN));
    }
}
