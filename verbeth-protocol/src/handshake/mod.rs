//! The two-phase handshake: Initiate / Respond, plus matching an incoming
//! response to a pending initiator contact.
//!
//! Unlinkability invariant: the responder's on-chain ephemeral `R` (the tag
//! key) and the ratchet ephemeral `R'` inside the sealed payload are two
//! independent keypairs. Reusing one would link the handshake response to the
//! first ratchet message header for any log observer.

mod initiate;
mod matching;
mod respond;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::encryption::EncryptionError;
use crate::crypto::kdf::KdfError;
use crate::crypto::key_exchange::KeyExchangeError;
use crate::crypto::pqc::{PqcError, MLKEM768_EK_BYTES};
use crate::identity::IdentityProof;
use crate::ratchet::RatchetError;
use crate::topics::TopicError;

pub use initiate::{initiate_handshake, OutboundHandshake};
pub use matching::{
    complete_handshake_as_initiator, match_handshake_response, MatchedHandshakeResponse,
};
pub use respond::{accept_handshake, AcceptHandshakeParams, AcceptOutcome, OutboundHandshakeResponse};

/// `e_pk(32) ‖ kem_ek(1184)`
pub const EPHEMERAL_BLOB_LEN: usize = 32 + MLKEM768_EK_BYTES;

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Invalid ephemeral blob length: {0}")]
    InvalidBlobLength(usize),
    #[error("Invalid unified public keys")]
    InvalidUnifiedKeys,
    #[error("Handshake carries no KEM material and hybrid mode is required")]
    KemRequired,
    #[error("Envelope encoding failed")]
    EnvelopeEncoding,
    #[error("Payload encoding failed")]
    PayloadEncoding,
    #[error("KEM operation failed: {0}")]
    Pqc(#[from] PqcError),
    #[error("Sealing failed: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("Key exchange failed: {0}")]
    KeyExchange(#[from] KeyExchangeError),
    #[error("Key derivation failed: {0}")]
    Kdf(#[from] KdfError),
    #[error("Topic derivation failed: {0}")]
    Topic(#[from] TopicError),
    #[error("Session init failed: {0}")]
    Ratchet(#[from] RatchetError),
}

pub type Result<T> = std::result::Result<T, HandshakeError>;

/// Cleartext envelope riding inside the Handshake event payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeEnvelope {
    pub plaintext: String,
    pub identity_proof: IdentityProof,
}

impl HandshakeEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|_| HandshakeError::EnvelopeEncoding)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// Encrypted response payload, bincode-encoded then sealed to `e_pk_A`
#[derive(Clone, Serialize, Deserialize)]
pub struct HandshakeResponsePayload {
    /// Responder's long-term X25519 identity key
    pub identity_pub: [u8; 32],
    /// Responder's Ed25519 signing key
    pub signing_pub: [u8; 32],
    /// The ratchet ephemeral `R'`; never appears on the wire in clear
    pub ratchet_pub: [u8; 32],
    pub note: Option<String>,
    pub identity_proof: IdentityProof,
    /// ML-KEM-768 ciphertext encapsulated to the initiator's KEM key
    pub kem_ciphertext: Vec<u8>,
}

impl HandshakeResponsePayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|_| HandshakeError::PayloadEncoding)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}

/// Initiator-side secrets persisted until a matching response arrives.
/// Exclusively owned; destroyed once the response is consumed.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingContact {
    pub contact_address: String,
    pub ephemeral_secret: [u8; 32],
    pub ephemeral_public: [u8; 32],
    pub kem_secret: Vec<u8>,
    pub kem_public: Vec<u8>,
    pub created_at: i64,
    pub tx_hash: Option<String>,
}

impl Drop for PendingContact {
    fn drop(&mut self) {
        self.ephemeral_secret.zeroize();
        self.kem_secret.zeroize();
    }
}

/// Split an ephemeral blob into `(e_pk, kem_ek)`
///
/// A bare 32-byte blob is a classical-only handshake (no KEM key); whether to
/// accept one is the `hybrid_required` policy of the receiving side.
pub fn split_ephemeral_blob(blob: &[u8]) -> Result<([u8; 32], Option<&[u8]>)> {
    if blob.len() != EPHEMERAL_BLOB_LEN && blob.len() != 32 {
        return Err(HandshakeError::InvalidBlobLength(blob.len()));
    }

    let mut e_pk = [0u8; 32];
    e_pk.copy_from_slice(&blob[..32]);
    let kem_ek = if blob.len() == EPHEMERAL_BLOB_LEN {
        Some(&blob[32..])
    } else {
        None
    };
    Ok((e_pk, kem_ek))
}
