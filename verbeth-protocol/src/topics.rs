//! Topic derivation: the public routing identifiers that rotate in lockstep
//! with the DH ratchet.
//!
//! Epoch-0 topics (v2) are derivable at handshake time from ephemeral DH
//! knowledge plus the hybrid tag as salt; no root key exists yet. From epoch 1
//! on (v3), topics bind to the root key, which a quantum adversary who later
//! breaks the classical DH never learns, so post-handshake topics stay
//! unlinkable to them.
//!
//! Direction labels are fixed in the initiator's frame. The responder swaps
//! labels for its own fields, so both parties produce identical bytes for the
//! same traffic direction.

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::hashing::keccak256;

const INFO_TOPIC_OUTBOUND_V2: &[u8] = b"verbeth:topic-outbound:v2";
const INFO_TOPIC_INBOUND_V2: &[u8] = b"verbeth:topic-inbound:v2";
const INFO_TOPIC_OUTBOUND_V3: &[u8] = b"verbeth:topic-outbound:v3";
const INFO_TOPIC_INBOUND_V3: &[u8] = b"verbeth:topic-inbound:v3";

#[derive(Error, Debug)]
pub enum TopicError {
    #[error("HKDF expansion failed")]
    ExpansionFailed,
}

pub type Result<T> = std::result::Result<T, TopicError>;

/// Traffic direction in the initiator's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicDirection {
    Outbound,
    Inbound,
}

impl TopicDirection {
    pub fn flipped(self) -> Self {
        match self {
            TopicDirection::Outbound => TopicDirection::Inbound,
            TopicDirection::Inbound => TopicDirection::Outbound,
        }
    }
}

/// Derive an epoch-0 topic from ephemeral DH output and the hybrid tag
///
/// # Arguments
/// * `dh_shared` - `X25519(r', e_pk_A)`, the ratchet-ephemeral DH
/// * `salt` - The 32 hybrid-tag bytes
/// * `direction` - Traffic direction in the initiator's frame
pub fn derive_epoch0_topic(
    dh_shared: &[u8; 32],
    salt: &[u8; 32],
    direction: TopicDirection,
) -> Result<[u8; 32]> {
    let info = match direction {
        TopicDirection::Outbound => INFO_TOPIC_OUTBOUND_V2,
        TopicDirection::Inbound => INFO_TOPIC_INBOUND_V2,
    };

    let hkdf = Hkdf::<Sha256>::new(Some(salt), dh_shared);
    let mut okm = [0u8; 32];
    hkdf.expand(info, &mut okm)
        .map_err(|_| TopicError::ExpansionFailed)?;

    let topic = keccak256(&okm);
    okm.zeroize();
    Ok(topic)
}

/// Derive a post-epoch topic from the root chain and a ratchet DH output
pub fn derive_topic(
    root_key: &[u8; 32],
    dh_output: &[u8; 32],
    direction: TopicDirection,
) -> Result<[u8; 32]> {
    let info = match direction {
        TopicDirection::Outbound => INFO_TOPIC_OUTBOUND_V3,
        TopicDirection::Inbound => INFO_TOPIC_INBOUND_V3,
    };

    let mut ikm = [0u8; 64];
    ikm[..32].copy_from_slice(root_key);
    ikm[32..].copy_from_slice(dh_output);

    let hkdf = Hkdf::<Sha256>::new(None, &ikm);
    let mut okm = [0u8; 32];
    let expanded = hkdf.expand(info, &mut okm);
    ikm.zeroize();
    expanded.map_err(|_| TopicError::ExpansionFailed)?;

    let topic = keccak256(&okm);
    okm.zeroize();
    Ok(topic)
}

/// Epoch-0 topic pair for one party, with the responder label swap applied
///
/// # Returns
/// (topic_outbound, topic_inbound) as seen by that party
pub fn derive_epoch0_pair(
    dh_shared: &[u8; 32],
    salt: &[u8; 32],
    is_initiator: bool,
) -> Result<([u8; 32], [u8; 32])> {
    let out_dir = if is_initiator {
        TopicDirection::Outbound
    } else {
        TopicDirection::Inbound
    };

    let outbound = derive_epoch0_topic(dh_shared, salt, out_dir)?;
    let inbound = derive_epoch0_topic(dh_shared, salt, out_dir.flipped())?;
    Ok((outbound, inbound))
}
