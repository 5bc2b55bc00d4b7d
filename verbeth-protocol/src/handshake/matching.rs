//! Matching an incoming HandshakeResponse to a pending initiator contact,
//! then instantiating the initiator-side session.

use crate::crypto::constant_time::eq_32;
use crate::crypto::{encryption, kdf, key_exchange, pqc};
use crate::events::HandshakeResponseEvent;
use crate::ratchet::{init_session_as_initiator, InitiatorSessionParams, RatchetSession};
use crate::topics::derive_epoch0_pair;

use super::{HandshakeResponsePayload, PendingContact, Result};

/// A response bound to one pending contact by hybrid-tag equality
pub struct MatchedHandshakeResponse {
    pub pending_index: usize,
    pub payload: HandshakeResponsePayload,
    /// `None` for a classical-only (no-KEM) response
    pub kem_shared: Option<[u8; 32]>,
    pub tag: [u8; 32],
}

/// Trial-decrypt an incoming response against every pending contact
///
/// O(N) over pending contacts: seal-open with each ephemeral secret,
/// KEM-decapsulate, recompute the hybrid tag and compare. First match wins
/// (a tag collision is negligible). Returns `None` when nothing matches:
/// the response is simply not for us; callers may log, the engine stays
/// silent.
pub fn match_handshake_response(
    event: &HandshakeResponseEvent,
    pending: &[PendingContact],
) -> Option<MatchedHandshakeResponse> {
    for (index, contact) in pending.iter().enumerate() {
        let payload_bytes = match encryption::open(&contact.ephemeral_secret, &event.ciphertext) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        let payload = match HandshakeResponsePayload::from_bytes(&payload_bytes) {
            Some(p) => p,
            None => continue,
        };

        let kem_shared = if payload.kem_ciphertext.is_empty() {
            None
        } else {
            match pqc::decapsulate(&payload.kem_ciphertext, &contact.kem_secret) {
                Ok(shared) => Some(shared),
                Err(_) => continue,
            }
        };

        let tag_dh = match key_exchange::derive_shared_secret(
            &contact.ephemeral_secret,
            &event.responder_ephemeral,
        ) {
            Ok(dh) => dh,
            Err(_) => continue,
        };
        let tag = match kdf::hybrid_tag(&tag_dh, &kem_shared.unwrap_or([0u8; 32])) {
            Ok(t) => t,
            Err(_) => continue,
        };

        if eq_32(&tag, &event.in_response_to) {
            return Some(MatchedHandshakeResponse {
                pending_index: index,
                payload,
                kem_shared,
                tag,
            });
        }
    }

    None
}

/// Build the initiator-side session from a matched response
///
/// The caller verifies the embedded identity proof against the responder
/// address via the oracle first; on success the pending contact is consumed
/// and must be deleted from storage.
pub fn complete_handshake_as_initiator(
    matched: &MatchedHandshakeResponse,
    contact: &PendingContact,
    my_address: &str,
    now_ms: i64,
) -> Result<RatchetSession> {
    let ratchet_dh = key_exchange::derive_shared_secret(
        &contact.ephemeral_secret,
        &matched.payload.ratchet_pub,
    )?;
    let (topic_outbound, topic_inbound) = derive_epoch0_pair(&ratchet_dh, &matched.tag, true)?;

    Ok(init_session_as_initiator(InitiatorSessionParams {
        my_address,
        contact_address: &contact.contact_address,
        their_signing_pub: matched.payload.signing_pub,
        ephemeral_secret: contact.ephemeral_secret,
        their_ratchet_public: matched.payload.ratchet_pub,
        topic_outbound,
        topic_inbound,
        kem_shared: matched.kem_shared,
        now_ms,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::handshake::{
        accept_handshake, initiate_handshake, AcceptHandshakeParams, AcceptOutcome,
    };
    use crate::identity::{verify_identity_proof, BindingExpectations};
    use crate::ratchet::{matches_session_topic, ratchet_decrypt, ratchet_encrypt, TopicMatch};
    use crate::testutil::{test_identity, StubVerifier};

    const ALICE: &str = "0x000000000000000000000000000000000000a11c";
    const BOB: &str = "0x0000000000000000000000000000000000000b0b";

    fn run_handshake() -> (
        AcceptOutcome,
        HandshakeResponseEvent,
        Vec<PendingContact>,
        usize,
    ) {
        let (alice_id, alice_proof) = test_identity([1u8; 32], ALICE);
        let (bob_id, bob_proof) = test_identity([2u8; 32], BOB);

        // A few unrelated pendings to exercise the trial loop
        let (_, decoy1) = initiate_handshake(
            "0x0000000000000000000000000000000000000c01",
            &alice_id,
            "hi",
            &alice_proof,
            10,
        )
        .unwrap();
        let (outbound, real) = initiate_handshake(BOB, &alice_id, "hi", &alice_proof, 20).unwrap();
        let (_, decoy2) = initiate_handshake(
            "0x0000000000000000000000000000000000000c02",
            &alice_id,
            "hi",
            &alice_proof,
            30,
        )
        .unwrap();

        let outcome = accept_handshake(AcceptHandshakeParams {
            initiator_address: ALICE,
            initiator_pub_keys: &outbound.pub_keys,
            ephemeral_blob: &outbound.ephemeral_blob,
            my_address: BOB,
            identity: &bob_id,
            note: Some("hey".to_string()),
            proof: &bob_proof,
            config: &ProtocolConfig::default(),
            now_ms: 40,
        })
        .unwrap();

        let event = HandshakeResponseEvent {
            in_response_to: outcome.response.in_response_to,
            responder: BOB.to_string(),
            responder_ephemeral: outcome.response.responder_ephemeral,
            ciphertext: outcome.response.ciphertext.clone(),
        };

        (outcome, event, vec![decoy1, real, decoy2], 1)
    }

    #[test]
    fn test_response_matches_exactly_one_pending() {
        let (_, event, pendings, real_index) = run_handshake();

        let matched = match_handshake_response(&event, &pendings).unwrap();
        assert_eq!(matched.pending_index, real_index);
        assert_eq!(matched.tag, event.in_response_to);
        assert_eq!(matched.payload.note.as_deref(), Some("hey"));
    }

    #[test]
    fn test_no_matching_pending_is_silent() {
        let (_, event, mut pendings, real_index) = run_handshake();
        pendings.remove(real_index);
        assert!(match_handshake_response(&event, &pendings).is_none());
    }

    #[test]
    fn test_tampered_tag_fails_to_match() {
        let (_, mut event, pendings, _) = run_handshake();
        event.in_response_to[0] ^= 1;
        assert!(match_handshake_response(&event, &pendings).is_none());
    }

    #[test]
    fn test_embedded_proof_verifies_against_responder() {
        let (_, event, pendings, _) = run_handshake();
        let matched = match_handshake_response(&event, &pendings).unwrap();

        let verifier = StubVerifier { key: [2u8; 32] };
        assert!(verify_identity_proof(
            &verifier,
            &matched.payload.identity_proof,
            BOB,
            &matched.payload.identity_pub,
            &matched.payload.signing_pub,
            &BindingExpectations::default(),
        ));
        // And fails against a different claimed responder
        assert!(!verify_identity_proof(
            &verifier,
            &matched.payload.identity_proof,
            ALICE,
            &matched.payload.identity_pub,
            &matched.payload.signing_pub,
            &BindingExpectations::default(),
        ));
    }

    #[test]
    fn test_completed_sessions_agree() {
        let (outcome, event, pendings, real_index) = run_handshake();
        let matched = match_handshake_response(&event, &pendings).unwrap();

        let alice_session =
            complete_handshake_as_initiator(&matched, &pendings[real_index], ALICE, 50).unwrap();
        let bob_session = outcome.session;

        assert_eq!(alice_session.conversation_id, bob_session.conversation_id);
        assert_eq!(
            alice_session.current_topic_outbound,
            bob_session.current_topic_inbound
        );
        assert_eq!(
            alice_session.current_topic_inbound,
            bob_session.current_topic_outbound
        );
        assert!(alice_session.is_initiator);
        assert_eq!(alice_session.topic_epoch, 0);
    }

    #[test]
    fn test_full_exchange_after_handshake() {
        let (outcome, event, pendings, real_index) = run_handshake();
        let matched = match_handshake_response(&event, &pendings).unwrap();
        let alice = complete_handshake_as_initiator(&matched, &pendings[real_index], ALICE, 50)
            .unwrap();
        let bob = outcome.session;

        let (_, alice_ed) = {
            let (id, _) = test_identity([1u8; 32], ALICE);
            (id.ed_public, id.ed_secret)
        };
        let (_, bob_ed) = {
            let (id, _) = test_identity([2u8; 32], BOB);
            (id.ed_public, id.ed_secret)
        };
        let cfg = ProtocolConfig::default();

        // m1: Alice → Bob on the epoch-0 topic
        let m1 = ratchet_encrypt(&alice, b"m1", &alice_ed, &cfg, 100).unwrap();
        assert_eq!(
            matches_session_topic(&bob, &m1.topic, 100),
            Some(TopicMatch::Current)
        );
        let bob_dec = ratchet_decrypt(&bob, &m1.header, &m1.ciphertext, &cfg, 100).unwrap();
        assert_eq!(bob_dec.plaintext, b"m1");

        // m2: Bob → Alice on Bob's rotated topic
        let m2 = ratchet_encrypt(&bob_dec.session, b"m2", &bob_ed, &cfg, 200).unwrap();
        assert_eq!(
            matches_session_topic(&m1.session, &m2.topic, 200),
            Some(TopicMatch::Next)
        );
        let alice_dec =
            ratchet_decrypt(&m1.session, &m2.header, &m2.ciphertext, &cfg, 200).unwrap();
        assert_eq!(alice_dec.plaintext, b"m2");

        // m3: Alice → Bob
        let m3 = ratchet_encrypt(&alice_dec.session, b"m3", &alice_ed, &cfg, 300).unwrap();
        let bob_dec2 =
            ratchet_decrypt(&m2.session, &m3.header, &m3.ciphertext, &cfg, 300).unwrap();
        assert_eq!(bob_dec2.plaintext, b"m3");

        // Both parties converged: same epoch, paired topics
        assert_eq!(alice_dec.session.topic_epoch, 1);
        assert_eq!(bob_dec2.session.topic_epoch, 2);
        assert_eq!(
            alice_dec.session.current_topic_outbound,
            bob_dec2.session.current_topic_inbound
        );
    }

    #[test]
    fn test_classical_only_handshake_round_trip() {
        let (alice_id, alice_proof) = test_identity([1u8; 32], ALICE);
        let (bob_id, bob_proof) = test_identity([2u8; 32], BOB);
        let (outbound, pending) =
            initiate_handshake(BOB, &alice_id, "hi", &alice_proof, 0).unwrap();

        // Responder accepts the bare X25519 ephemeral under a relaxed policy
        let relaxed = ProtocolConfig {
            hybrid_required: false,
            ..Default::default()
        };
        let outcome = accept_handshake(AcceptHandshakeParams {
            initiator_address: ALICE,
            initiator_pub_keys: &outbound.pub_keys,
            ephemeral_blob: &outbound.ephemeral_blob[..32],
            my_address: BOB,
            identity: &bob_id,
            note: None,
            proof: &bob_proof,
            config: &relaxed,
            now_ms: 0,
        })
        .unwrap();

        let event = HandshakeResponseEvent {
            in_response_to: outcome.response.in_response_to,
            responder: BOB.to_string(),
            responder_ephemeral: outcome.response.responder_ephemeral,
            ciphertext: outcome.response.ciphertext.clone(),
        };
        let pendings = vec![pending];
        let matched = match_handshake_response(&event, &pendings).unwrap();
        assert!(matched.kem_shared.is_none());

        let alice = complete_handshake_as_initiator(&matched, &pendings[0], ALICE, 0).unwrap();
        let bob = outcome.session;
        assert_eq!(alice.conversation_id, bob.conversation_id);

        // The sessions still work, seeded from the DH share alone
        let m1 = ratchet_encrypt(&alice, b"classical", &alice_id.ed_secret, &relaxed, 10).unwrap();
        let dec = ratchet_decrypt(&bob, &m1.header, &m1.ciphertext, &relaxed, 10).unwrap();
        assert_eq!(dec.plaintext, b"classical");
    }

    #[test]
    fn test_handshake_and_first_message_unlinkable() {
        let (outcome, event, pendings, real_index) = run_handshake();
        let matched = match_handshake_response(&event, &pendings).unwrap();
        let alice = complete_handshake_as_initiator(&matched, &pendings[real_index], ALICE, 50)
            .unwrap();

        let (_, alice_ed) = {
            let (id, _) = test_identity([1u8; 32], ALICE);
            (id.ed_public, id.ed_secret)
        };
        let m1 = ratchet_encrypt(&alice, b"m1", &alice_ed, &ProtocolConfig::default(), 100)
            .unwrap();

        // No 32-byte field is shared between the on-chain response and the
        // first message header
        assert_ne!(m1.header.dh, event.responder_ephemeral);
        assert_ne!(m1.header.dh, matched.payload.ratchet_pub);
        assert_ne!(m1.topic, event.in_response_to);

        // Bob's first reply rotates too: its header key is neither R nor R'
        let bob = outcome.session;
        let cfg = ProtocolConfig::default();
        let bob_dec = ratchet_decrypt(&bob, &m1.header, &m1.ciphertext, &cfg, 100).unwrap();
        let (_, bob_ed) = {
            let (id, _) = test_identity([2u8; 32], BOB);
            (id.ed_public, id.ed_secret)
        };
        let m2 = ratchet_encrypt(&bob_dec.session, b"m2", &bob_ed, &cfg, 200).unwrap();
        assert_ne!(m2.header.dh, event.responder_ephemeral);
        assert_ne!(m2.header.dh, matched.payload.ratchet_pub);
    }
}
