//! VerbEth protocol SDK.
//!
//! End-to-end-encrypted messaging over a public append-only log: a
//! post-quantum hybrid handshake, a Double-Ratchet-style session engine with
//! per-message keys and skipped-key tracking, and a topic ratchet that
//! rotates the public routing identifier in lockstep with each DH step.
//!
//! Everything here is pure and synchronous. Stores, transaction submission
//! and identity-proof oracles are external collaborators; see the
//! `verbeth-core` crate for the orchestration layer.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod events;
pub mod handshake;
pub mod identity;
pub mod ratchet;
pub mod topics;

pub use codec::{
    encode_ratchet_payload, is_ratchet_payload, parse_ratchet_payload, verify_message_signature,
    RatchetPayload, RATCHET_PAYLOAD_MIN_LEN, RATCHET_PAYLOAD_VERSION,
};
pub use config::{ProtocolConfig, BINDING_CONTEXT, BINDING_VERSION};
pub use events::{HandshakeEvent, HandshakeResponseEvent, MessageEvent};
pub use handshake::{
    accept_handshake, complete_handshake_as_initiator, initiate_handshake,
    match_handshake_response, AcceptHandshakeParams, AcceptOutcome, HandshakeEnvelope,
    HandshakeError, HandshakeResponsePayload, MatchedHandshakeResponse, OutboundHandshake,
    OutboundHandshakeResponse, PendingContact, EPHEMERAL_BLOB_LEN,
};
pub use identity::{
    derive_identity, parse_unified_pub_keys, verify_identity_proof, BindingContext,
    BindingExpectations, IdentityKeyPair, IdentityProof, MessageSignatureVerifier, MessageSigner,
    UNIFIED_PUB_KEYS_LEN,
};
pub use ratchet::{
    conversation_id_from_topics, init_session_as_initiator, init_session_as_responder,
    matches_session_topic, prune_expired_skipped_keys, ratchet_decrypt, ratchet_encrypt,
    InitiatorSessionParams, RatchetDecryptOutcome, RatchetEncryptOutcome, RatchetError,
    RatchetHeader, RatchetSession, ResponderSessionParams, SkippedMessageKey, TopicMatch,
    HEADER_LEN,
};
pub use topics::{derive_epoch0_pair, derive_epoch0_topic, derive_topic, TopicDirection};
