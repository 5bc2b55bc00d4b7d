//! The ratchet session engine: DH ratchet, symmetric chains and the topic
//! ratchet, driven by the same stream of encrypt/decrypt events.
//!
//! Operations are pure: they take a session by reference and return the
//! advanced session. The caller persists the result before acting on any
//! output; nothing here mutates in place, so a failed operation leaves the
//! stored session untouched.

pub mod engine;
pub mod skipped;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::hashing::keccak256_concat;
use crate::crypto::{kdf, key_exchange};
use crate::topics::{self, TopicDirection};

pub use engine::{
    matches_session_topic, prune_expired_skipped_keys, ratchet_decrypt, ratchet_encrypt,
    RatchetDecryptOutcome, RatchetEncryptOutcome, RatchetError,
};
pub use skipped::SkippedMessageKey;

/// Serialized header length: dh(32) ‖ pn(4) ‖ n(4)
pub const HEADER_LEN: usize = 40;

pub type Result<T> = std::result::Result<T, RatchetError>;

/// Per-message header carried inside the framed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetHeader {
    /// Sender's current DH ratchet public key
    pub dh: [u8; 32],
    /// Number of messages in the sender's previous sending chain
    pub pn: u32,
    /// Message number in the sender's current sending chain
    pub n: u32,
}

impl RatchetHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..32].copy_from_slice(&self.dh);
        out[32..36].copy_from_slice(&self.pn.to_be_bytes());
        out[36..40].copy_from_slice(&self.n.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HEADER_LEN {
            return None;
        }

        let mut dh = [0u8; 32];
        dh.copy_from_slice(&bytes[..32]);
        let pn = u32::from_be_bytes(bytes[32..36].try_into().ok()?);
        let n = u32::from_be_bytes(bytes[36..40].try_into().ok()?);

        Some(Self { dh, pn, n })
    }
}

/// How an incoming topic relates to a session's inbound fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicMatch {
    Current,
    Next,
    Previous,
}

/// The central session record. Plain data, owned by whatever store the host
/// injects; cloned and advanced by the engine.
#[derive(Clone, Serialize, Deserialize)]
pub struct RatchetSession {
    /// Order-independent hash of the two epoch-0 topics; stable for life
    pub conversation_id: [u8; 32],
    pub my_address: String,
    pub contact_address: String,
    /// Contact's Ed25519 key for the auth-first gate
    pub their_signing_pub: [u8; 32],
    /// Label-swap role: true for the party that sent the handshake
    pub is_initiator: bool,

    // ── Root chain ──
    pub root_key: [u8; 32],

    // ── DH ratchet ──
    pub dh_my_secret: [u8; 32],
    pub dh_my_public: [u8; 32],
    pub dh_their_public: [u8; 32],

    // ── Sending chain ──
    pub sending_chain_key: Option<[u8; 32]>,
    pub sending_msg_number: u32,
    pub previous_chain_length: u32,

    // ── Receiving chain ──
    pub receiving_chain_key: Option<[u8; 32]>,
    pub receiving_msg_number: u32,

    // ── Topic ratchet ──
    pub topic_epoch: u32,
    pub current_topic_outbound: [u8; 32],
    pub current_topic_inbound: [u8; 32],
    pub next_topic_outbound: Option<[u8; 32]>,
    pub next_topic_inbound: Option<[u8; 32]>,
    pub previous_topic_inbound: Option<[u8; 32]>,
    pub previous_topic_expiry: Option<i64>,

    // ── Handshake anchors (immutable, for lookup) ──
    pub topic_outbound: [u8; 32],
    pub topic_inbound: [u8; 32],

    // ── Skipped message keys ──
    pub skipped_keys: Vec<SkippedMessageKey>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Drop for RatchetSession {
    fn drop(&mut self) {
        self.root_key.zeroize();
        self.dh_my_secret.zeroize();
        if let Some(ref mut k) = self.sending_chain_key {
            k.zeroize();
        }
        if let Some(ref mut k) = self.receiving_chain_key {
            k.zeroize();
        }
    }
}

impl RatchetSession {
    /// Direction label for this party's outbound traffic; the inbound label
    /// is its flip
    pub(crate) fn outbound_label(&self) -> TopicDirection {
        if self.is_initiator {
            TopicDirection::Outbound
        } else {
            TopicDirection::Inbound
        }
    }
}

/// Deterministic, order-independent conversation identifier
pub fn conversation_id_from_topics(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    if a <= b {
        keccak256_concat(a, b)
    } else {
        keccak256_concat(b, a)
    }
}

/// Inputs for the responder-side session
pub struct ResponderSessionParams<'a> {
    pub my_address: &'a str,
    pub contact_address: &'a str,
    pub their_signing_pub: [u8; 32],
    /// Ratchet ephemeral secret `r'` (NOT the tag ephemeral)
    pub ratchet_secret: [u8; 32],
    /// Ratchet ephemeral public `R'`
    pub ratchet_public: [u8; 32],
    /// Initiator's handshake ephemeral `e_pk_A`
    pub their_ephemeral: [u8; 32],
    /// Epoch-0 topics as seen by the responder (labels already swapped)
    pub topic_outbound: [u8; 32],
    pub topic_inbound: [u8; 32],
    pub kem_shared: Option<[u8; 32]>,
    pub now_ms: i64,
}

/// Inputs for the initiator-side session
pub struct InitiatorSessionParams<'a> {
    pub my_address: &'a str,
    pub contact_address: &'a str,
    pub their_signing_pub: [u8; 32],
    /// The persisted handshake ephemeral secret `e_sk_A`
    pub ephemeral_secret: [u8; 32],
    /// Responder's ratchet ephemeral `R'` from the decrypted response
    pub their_ratchet_public: [u8; 32],
    pub topic_outbound: [u8; 32],
    pub topic_inbound: [u8; 32],
    pub kem_shared: Option<[u8; 32]>,
    pub now_ms: i64,
}

fn initial_root_material(
    dh0: &[u8; 32],
    kem_shared: Option<&[u8; 32]>,
) -> Result<([u8; 32], [u8; 32])> {
    let seed = match kem_shared {
        Some(kem) => kdf::hybrid_initial_secret(dh0, kem)?,
        None => *dh0,
    };
    Ok(kdf::root_init(&seed)?)
}

/// Create the responder-side session after accepting a handshake
///
/// The seed-derived chain key becomes the responder's epoch-0 sending chain.
/// The receiving chain stays empty: the responder cannot decrypt until the
/// initiator's first message carries a fresh DH key and drives the first full
/// ratchet step.
pub fn init_session_as_responder(params: ResponderSessionParams<'_>) -> Result<RatchetSession> {
    let dh0 = key_exchange::derive_shared_secret(&params.ratchet_secret, &params.their_ephemeral)?;
    let (root_key, chain0) = initial_root_material(&dh0, params.kem_shared.as_ref())?;

    Ok(RatchetSession {
        conversation_id: conversation_id_from_topics(&params.topic_outbound, &params.topic_inbound),
        my_address: params.my_address.to_string(),
        contact_address: params.contact_address.to_string(),
        their_signing_pub: params.their_signing_pub,
        is_initiator: false,
        root_key,
        dh_my_secret: params.ratchet_secret,
        dh_my_public: params.ratchet_public,
        dh_their_public: params.their_ephemeral,
        sending_chain_key: Some(chain0),
        sending_msg_number: 0,
        previous_chain_length: 0,
        receiving_chain_key: None,
        receiving_msg_number: 0,
        topic_epoch: 0,
        current_topic_outbound: params.topic_outbound,
        current_topic_inbound: params.topic_inbound,
        next_topic_outbound: None,
        next_topic_inbound: None,
        previous_topic_inbound: None,
        previous_topic_expiry: None,
        topic_outbound: params.topic_outbound,
        topic_inbound: params.topic_inbound,
        skipped_keys: Vec::new(),
        created_at: params.now_ms,
        updated_at: params.now_ms,
    })
}

/// Create the initiator-side session after matching a handshake response
///
/// The initiator performs its first ratchet step immediately: a fresh local
/// key against the responder's `R'` seeds the sending chain, and the
/// resulting root advancement yields the next-epoch topic hints. The current
/// topics stay at the epoch-0 pair, so first messages remain routable with
/// handshake-only knowledge; the seed-derived chain key is kept as the
/// receiving chain for the responder's epoch-0 sends.
pub fn init_session_as_initiator(params: InitiatorSessionParams<'_>) -> Result<RatchetSession> {
    let dh0 =
        key_exchange::derive_shared_secret(&params.ephemeral_secret, &params.their_ratchet_public)?;
    let (root0, chain0) = initial_root_material(&dh0, params.kem_shared.as_ref())?;

    // First DH ratchet step: fresh local key vs R'
    let (my_public, my_secret) = key_exchange::generate_keypair();
    let dh1 = key_exchange::derive_shared_secret(&my_secret, &params.their_ratchet_public)?;
    let (root1, sending_chain) = kdf::ratchet_step(&root0, &dh1)?;

    let out_label = TopicDirection::Outbound;
    let next_outbound = topics::derive_topic(&root1, &dh1, out_label)?;
    let next_inbound = topics::derive_topic(&root1, &dh1, out_label.flipped())?;

    Ok(RatchetSession {
        conversation_id: conversation_id_from_topics(&params.topic_outbound, &params.topic_inbound),
        my_address: params.my_address.to_string(),
        contact_address: params.contact_address.to_string(),
        their_signing_pub: params.their_signing_pub,
        is_initiator: true,
        root_key: root1,
        dh_my_secret: my_secret,
        dh_my_public: my_public,
        dh_their_public: params.their_ratchet_public,
        sending_chain_key: Some(sending_chain),
        sending_msg_number: 0,
        previous_chain_length: 0,
        receiving_chain_key: Some(chain0),
        receiving_msg_number: 0,
        topic_epoch: 0,
        current_topic_outbound: params.topic_outbound,
        current_topic_inbound: params.topic_inbound,
        next_topic_outbound: Some(next_outbound),
        next_topic_inbound: Some(next_inbound),
        previous_topic_inbound: None,
        previous_topic_expiry: None,
        topic_outbound: params.topic_outbound,
        topic_inbound: params.topic_inbound,
        skipped_keys: Vec::new(),
        created_at: params.now_ms,
        updated_at: params.now_ms,
    })
}
