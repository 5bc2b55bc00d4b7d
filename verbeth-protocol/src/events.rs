//! Event-log record types. The engine is wire-format-agnostic beyond these
//! field lists; the ABI, topics-vs-data split and RPC plumbing live with the
//! host application.

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::identity::UNIFIED_PUB_KEYS_LEN;

/// First half of the handshake, emitted by the initiator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeEvent {
    /// `keccak256("contact:" ‖ lower(recipient_address))`
    pub recipient_hash: [u8; 32],
    /// Initiator address
    pub sender: String,
    /// Unified identity keys: `0x01 ‖ pkX25519 ‖ pkEd25519`
    #[serde(with = "BigArray")]
    pub pub_keys: [u8; UNIFIED_PUB_KEYS_LEN],
    /// `e_pk(32) ‖ kem_ek(1184)`, 1216 bytes
    pub ephemeral_blob: Vec<u8>,
    /// JSON envelope `{plaintext, identity_proof}`
    pub payload: Vec<u8>,
}

impl HandshakeEvent {
    /// Whether this handshake addresses the given wallet
    pub fn is_for(&self, address: &str) -> bool {
        crate::crypto::constant_time::eq_32(
            &self.recipient_hash,
            &crate::crypto::hashing::recipient_hash(address),
        )
    }
}

/// Second half of the handshake, emitted by the responder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponseEvent {
    /// The hybrid tag binding this response to one pending initiator contact
    pub in_response_to: [u8; 32],
    /// Responder address
    pub responder: String,
    /// The tag ephemeral `R`, deliberately NOT the ratchet ephemeral
    pub responder_ephemeral: [u8; 32],
    /// Sealed `HandshakeResponsePayload`
    pub ciphertext: Vec<u8>,
}

/// A ratchet message on a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Sender address as recorded by the log
    pub sender: String,
    /// 32-byte routing topic
    pub topic: [u8; 32],
    /// Framed ratchet payload (version ‖ signature ‖ header ‖ ciphertext)
    pub ciphertext: Vec<u8>,
    /// Log timestamp, seconds
    pub timestamp: u64,
    /// Submitter nonce
    pub nonce: u64,
}
