//! Initiator path: first contact over the log.

use crate::crypto::hashing::recipient_hash;
use crate::crypto::{key_exchange, pqc};
use crate::identity::{IdentityKeyPair, IdentityProof, UNIFIED_PUB_KEYS_LEN};

use super::{HandshakeEnvelope, PendingContact, Result};

/// Body of the Handshake event the caller submits to the log
#[derive(Debug, Clone)]
pub struct OutboundHandshake {
    pub recipient_hash: [u8; 32],
    pub pub_keys: [u8; UNIFIED_PUB_KEYS_LEN],
    pub ephemeral_blob: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Open a conversation with `recipient_address`
///
/// Generates a fresh X25519 ephemeral and a fresh ML-KEM-768 keypair; both
/// secrets come back in the `PendingContact`, which the caller MUST persist
/// keyed by contact; without it a later response can never be matched.
///
/// # Returns
/// (event body, pending contact secrets)
pub fn initiate_handshake(
    recipient_address: &str,
    identity: &IdentityKeyPair,
    plaintext: &str,
    proof: &IdentityProof,
    now_ms: i64,
) -> Result<(OutboundHandshake, PendingContact)> {
    let (ephemeral_public, ephemeral_secret) = key_exchange::generate_keypair();
    let kem = pqc::generate_keypair();

    let mut ephemeral_blob = Vec::with_capacity(super::EPHEMERAL_BLOB_LEN);
    ephemeral_blob.extend_from_slice(&ephemeral_public);
    ephemeral_blob.extend_from_slice(&kem.public);

    let envelope = HandshakeEnvelope {
        plaintext: plaintext.to_string(),
        identity_proof: proof.clone(),
    };

    let outbound = OutboundHandshake {
        recipient_hash: recipient_hash(recipient_address),
        pub_keys: identity.unified_pub_keys(),
        ephemeral_blob,
        payload: envelope.to_bytes()?,
    };

    let pending = PendingContact {
        contact_address: recipient_address.to_ascii_lowercase(),
        ephemeral_secret,
        ephemeral_public,
        kem_secret: kem.secret.clone(),
        kem_public: kem.public.clone(),
        created_at: now_ms,
        tx_hash: None,
    };

    Ok((outbound, pending))
}
