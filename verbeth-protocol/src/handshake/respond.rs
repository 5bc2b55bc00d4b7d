//! Responder path: accept a handshake and create the responder-side session.

use crate::config::ProtocolConfig;
use crate::crypto::{encryption, kdf, key_exchange, pqc};
use crate::identity::{parse_unified_pub_keys, IdentityKeyPair, IdentityProof};
use crate::ratchet::{init_session_as_responder, RatchetSession, ResponderSessionParams};
use crate::topics::derive_epoch0_pair;

use super::{split_ephemeral_blob, HandshakeError, HandshakeResponsePayload, Result};

/// Body of the HandshakeResponse event the caller submits to the log
#[derive(Debug, Clone)]
pub struct OutboundHandshakeResponse {
    /// The hybrid tag; the initiator matches on this
    pub in_response_to: [u8; 32],
    /// The tag ephemeral `R`
    pub responder_ephemeral: [u8; 32],
    /// Sealed `HandshakeResponsePayload`
    pub ciphertext: Vec<u8>,
}

pub struct AcceptHandshakeParams<'a> {
    pub initiator_address: &'a str,
    /// Unified key blob from the Handshake event (65 bytes)
    pub initiator_pub_keys: &'a [u8],
    /// `e_pk ‖ kem_ek` from the Handshake event (1216 bytes)
    pub ephemeral_blob: &'a [u8],
    pub my_address: &'a str,
    pub identity: &'a IdentityKeyPair,
    pub note: Option<String>,
    pub proof: &'a IdentityProof,
    pub config: &'a ProtocolConfig,
    pub now_ms: i64,
}

pub struct AcceptOutcome {
    pub response: OutboundHandshakeResponse,
    pub session: RatchetSession,
}

/// Accept an incoming handshake
///
/// The caller is expected to have run the initiator's identity proof through
/// the verification oracle before accepting; this function only does the
/// cryptography.
///
/// Two independent ephemerals are generated: the tag pair `(r, R)` that
/// appears on the log, and the ratchet pair `(r', R')` that only travels
/// inside the sealed payload. The hybrid tag binds `R` and the KEM share to
/// exactly one pending initiator contact.
pub fn accept_handshake(params: AcceptHandshakeParams<'_>) -> Result<AcceptOutcome> {
    let (_, initiator_signing_pub) = parse_unified_pub_keys(params.initiator_pub_keys)
        .map_err(|_| HandshakeError::InvalidUnifiedKeys)?;
    let (initiator_ephemeral, initiator_kem_ek) = split_ephemeral_blob(params.ephemeral_blob)?;
    if initiator_kem_ek.is_none() && params.config.hybrid_required {
        return Err(HandshakeError::KemRequired);
    }

    // Tag keypair (on the log) and ratchet keypair (sealed) stay independent
    let (tag_public, tag_secret) = key_exchange::generate_keypair();
    let (ratchet_public, ratchet_secret) = key_exchange::generate_keypair();

    let (kem_ciphertext, kem_shared) = match initiator_kem_ek {
        Some(kem_ek) => {
            let (ct, shared) = pqc::encapsulate(kem_ek)?;
            (ct, Some(shared))
        }
        None => (Vec::new(), None),
    };

    let tag_dh = key_exchange::derive_shared_secret(&tag_secret, &initiator_ephemeral)?;
    let tag = kdf::hybrid_tag(&tag_dh, &kem_shared.unwrap_or([0u8; 32]))?;

    let payload = HandshakeResponsePayload {
        identity_pub: params.identity.x25519_public,
        signing_pub: params.identity.ed_public,
        ratchet_pub: ratchet_public,
        note: params.note,
        identity_proof: params.proof.clone(),
        kem_ciphertext,
    };
    let ciphertext = encryption::seal(&initiator_ephemeral, &payload.to_bytes()?)?;

    let ratchet_dh = key_exchange::derive_shared_secret(&ratchet_secret, &initiator_ephemeral)?;
    let (topic_outbound, topic_inbound) = derive_epoch0_pair(&ratchet_dh, &tag, false)?;

    let session = init_session_as_responder(ResponderSessionParams {
        my_address: params.my_address,
        contact_address: params.initiator_address,
        their_signing_pub: initiator_signing_pub,
        ratchet_secret,
        ratchet_public,
        their_ephemeral: initiator_ephemeral,
        topic_outbound,
        topic_inbound,
        kem_shared,
        now_ms: params.now_ms,
    })?;

    Ok(AcceptOutcome {
        response: OutboundHandshakeResponse {
            in_response_to: tag,
            responder_ephemeral: tag_public,
            ciphertext,
        },
        session,
    })
}
