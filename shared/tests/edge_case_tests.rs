//! Error handling and edge case tests
//!
//! Tests error display, invalid inputs, and boundary conditions of the
//! public API.

use custos_shared::{
    Certificate, CertificateAuthority, CryptoError, EncryptedMessage, EscrowAuthority, KeyPair,
    MessageHeader, MessageKey, RatchetSession, SessionConfig, PROTOCOL_VERSION,
};

// ============================================================================
// Error Type Tests
// ============================================================================

#[test]
fn test_error_display() {
    let error = CryptoError::InvalidKey("test key error".to_string());
    let display = format!("{}", error);
    assert!(display.contains("Invalid key"));
    assert!(display.contains("test key error"));

    let error = CryptoError::NoCertificateForPeer("carol".to_string());
    assert!(format!("{}", error).contains("carol"));

    let error = CryptoError::TooManySkippedMessages {
        requested: 2001,
        limit: 2000,
    };
    let display = format!("{}", error);
    assert!(display.contains("2001"));
    assert!(display.contains("2000"));
}

#[test]
fn test_error_debug() {
    let error = CryptoError::ReplayDetected;
    assert!(format!("{:?}", error).contains("ReplayDetected"));
}

// ============================================================================
// Boundary Condition Tests
// ============================================================================

#[test]
fn test_large_plaintext() {
    let alice_id = KeyPair::generate();
    let bob_id = KeyPair::generate();
    let escrow = EscrowAuthority::generate();
    let config = SessionConfig::default();
    let mut alice = RatchetSession::initiator(&alice_id, bob_id.public(), config).unwrap();
    let mut bob = RatchetSession::responder(&bob_id, alice_id.public(), config).unwrap();

    let plaintext = vec![0xA5; 1 << 20];
    let msg = alice.encrypt(&plaintext, &escrow.public_key()).unwrap();
    assert_eq!(msg.ciphertext.len(), plaintext.len() + 16);
    assert_eq!(bob.decrypt(&msg).unwrap(), plaintext);
}

#[test]
fn test_responder_has_no_sending_chain() {
    let alice_id = KeyPair::generate();
    let bob_id = KeyPair::generate();
    let escrow = EscrowAuthority::generate();
    let mut bob =
        RatchetSession::responder(&bob_id, alice_id.public(), SessionConfig::default()).unwrap();

    assert!(!bob.can_send());
    assert!(matches!(
        bob.encrypt(b"too early", &escrow.public_key()),
        Err(CryptoError::RatchetError(_))
    ));
    assert_eq!(bob.info().send_count, 0);
}

#[test]
fn test_message_key_import_length() {
    assert!(MessageKey::import_raw(&[0u8; 31]).is_err());
    assert!(MessageKey::import_raw(&[0u8; 33]).is_err());
    assert!(MessageKey::import_raw(&[7u8; 32]).is_ok());
}

#[test]
fn test_certificate_username_bounds() {
    let key = KeyPair::generate();
    assert!(matches!(
        Certificate::new("", key.public()),
        Err(CryptoError::InvalidCertificate(_))
    ));
    assert!(Certificate::new("a".repeat(255), key.public()).is_ok());
    assert!(Certificate::new("a".repeat(256), key.public()).is_err());
}

#[test]
fn test_certificate_signature_bound_to_key() {
    let ca = CertificateAuthority::generate();
    let verifier = custos_shared::CertificateVerifier::new(ca.verifying_key());
    let cert = Certificate::new("alice", KeyPair::generate().public()).unwrap();
    let signature = ca.sign(&cert).unwrap();

    let swapped = Certificate::new("alice", KeyPair::generate().public()).unwrap();
    assert_eq!(
        verifier.verify(&swapped, &signature).map(|_| ()),
        Err(CryptoError::CertificateVerificationFailed)
    );
}

// ============================================================================
// Malformed Input Tests
// ============================================================================

#[test]
fn test_header_rejects_malformed_bytes() {
    assert!(matches!(
        MessageHeader::from_bytes(&[]),
        Err(CryptoError::InvalidHeader(_))
    ));

    let mut wrong_version = vec![PROTOCOL_VERSION.wrapping_add(1)];
    wrong_version.extend_from_slice(&[0u8; 200]);
    assert!(matches!(
        MessageHeader::from_bytes(&wrong_version),
        Err(CryptoError::InvalidHeader(_))
    ));
}

#[test]
fn test_wire_rejects_garbage() {
    assert!(matches!(
        EncryptedMessage::from_wire(b"not msgpack at all"),
        Err(CryptoError::SerializationError(_))
    ));
}

#[test]
fn test_escrow_rejects_header_without_wrapped_key() {
    let escrow = EscrowAuthority::generate();
    let header = MessageHeader {
        ratchet_public: KeyPair::generate().public_bytes(),
        previous_chain_length: 0,
        counter: 0,
        escrow_ephemeral_public: KeyPair::generate().public_bytes(),
        escrow_ciphertext: Vec::new(),
        escrow_nonce: [0u8; 12],
        message_nonce: [0u8; 12],
    };
    assert!(escrow.recover_message_key(&header).is_err());
}
