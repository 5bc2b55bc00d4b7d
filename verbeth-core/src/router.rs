//! Ingress routing: dispatch raw log events to the right session by topic,
//! gate on the sender's signature, decrypt, persist, deliver.
//!
//! Decrypt failures are silent by design (an observer probing topics learns
//! nothing from our behavior); they are logged at debug level only.

use thiserror::Error;

use verbeth_protocol::codec::{is_ratchet_payload, parse_ratchet_payload, verify_message_signature};
use verbeth_protocol::config::ProtocolConfig;
use verbeth_protocol::events::{HandshakeEvent, HandshakeResponseEvent, MessageEvent};
use verbeth_protocol::handshake::{
    complete_handshake_as_initiator, match_handshake_response, HandshakeEnvelope, PendingContact,
};
use verbeth_protocol::identity::{
    parse_unified_pub_keys, verify_identity_proof, BindingExpectations, IdentityProof,
    MessageSignatureVerifier,
};
use verbeth_protocol::ratchet::{ratchet_decrypt, RatchetSession, TopicMatch};

use crate::store::{SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RouterError>;

/// A decrypted message delivered to the caller
pub struct InboundMessage {
    pub conversation_id: [u8; 32],
    pub plaintext: Vec<u8>,
    pub topic: [u8; 32],
    pub topic_match: TopicMatch,
    /// Session state after the decrypt, already persisted
    pub session: RatchetSession,
}

/// A verified incoming handshake, ready for the caller to accept or ignore
pub struct IncomingHandshake {
    pub sender: String,
    pub x25519_pub: [u8; 32],
    pub ed_pub: [u8; 32],
    pub plaintext: String,
    pub identity_proof: IdentityProof,
}

pub struct IngressRouter {
    config: ProtocolConfig,
}

impl IngressRouter {
    pub fn new(config: ProtocolConfig) -> Self {
        Self { config }
    }

    /// Route a Message event: topic lookup, auth-first gate, decrypt,
    /// persist. `None` means the event was not for us or failed silently.
    pub fn handle_message_event(
        &self,
        sessions: &mut dyn SessionStore,
        event: &MessageEvent,
        now_ms: i64,
    ) -> Result<Option<InboundMessage>> {
        if !is_ratchet_payload(&event.ciphertext) {
            log::debug!("dropping non-ratchet payload on topic {}", hex::encode(event.topic));
            return Ok(None);
        }
        let Some(payload) = parse_ratchet_payload(&event.ciphertext) else {
            log::debug!("malformed ratchet payload on topic {}", hex::encode(event.topic));
            return Ok(None);
        };

        let Some((session, topic_match)) = sessions.get_by_inbound_topic(&event.topic, now_ms)?
        else {
            log::debug!("no session listening on topic {}", hex::encode(event.topic));
            return Ok(None);
        };

        // Auth first: no ratchet state may move for an unsigned payload
        if !verify_message_signature(&payload, &session.their_signing_pub) {
            log::warn!(
                "signature check failed for conversation {}",
                hex::encode(session.conversation_id)
            );
            return Ok(None);
        }

        let outcome =
            match ratchet_decrypt(&session, &payload.header, &payload.ciphertext, &self.config, now_ms)
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    log::debug!(
                        "decrypt failed for conversation {}: {}",
                        hex::encode(session.conversation_id),
                        err
                    );
                    return Ok(None);
                }
            };

        sessions.save(outcome.session.clone())?;

        Ok(Some(InboundMessage {
            conversation_id: outcome.session.conversation_id,
            plaintext: outcome.plaintext,
            topic: event.topic,
            topic_match,
            session: outcome.session,
        }))
    }

    /// Parse and verify an incoming Handshake event. The caller decides
    /// whether to accept; nothing is persisted here.
    pub fn handle_handshake_event(
        &self,
        oracle: &dyn MessageSignatureVerifier,
        event: &HandshakeEvent,
        expectations: &BindingExpectations,
    ) -> Option<IncomingHandshake> {
        let (x25519_pub, ed_pub) = parse_unified_pub_keys(&event.pub_keys).ok()?;
        let envelope = HandshakeEnvelope::from_bytes(&event.payload)?;

        if !verify_identity_proof(
            oracle,
            &envelope.identity_proof,
            &event.sender,
            &x25519_pub,
            &ed_pub,
            expectations,
        ) {
            log::warn!("handshake from {} failed identity verification", event.sender);
            return None;
        }

        Some(IncomingHandshake {
            sender: event.sender.clone(),
            x25519_pub,
            ed_pub,
            plaintext: envelope.plaintext,
            identity_proof: envelope.identity_proof,
        })
    }

    /// Route a HandshakeResponse event through the pending-contact matcher
    /// and the identity oracle; on success the initiator session is created
    /// and persisted.
    ///
    /// # Returns
    /// The index of the consumed pending contact (the caller deletes it) and
    /// the new session.
    pub fn handle_handshake_response_event(
        &self,
        oracle: &dyn MessageSignatureVerifier,
        sessions: &mut dyn SessionStore,
        event: &HandshakeResponseEvent,
        pending: &[PendingContact],
        my_address: &str,
        expectations: &BindingExpectations,
        now_ms: i64,
    ) -> Result<Option<(usize, RatchetSession)>> {
        let Some(matched) = match_handshake_response(event, pending) else {
            // Not for us; dropped without a trace
            return Ok(None);
        };

        if self.config.hybrid_required && matched.kem_shared.is_none() {
            log::warn!(
                "rejecting non-hybrid handshake response from {}",
                event.responder
            );
            return Ok(None);
        }

        if !verify_identity_proof(
            oracle,
            &matched.payload.identity_proof,
            &event.responder,
            &matched.payload.identity_pub,
            &matched.payload.signing_pub,
            expectations,
        ) {
            log::warn!(
                "handshake response from {} failed identity verification",
                event.responder
            );
            return Ok(None);
        }

        let contact = &pending[matched.pending_index];
        let session = match complete_handshake_as_initiator(&matched, contact, my_address, now_ms) {
            Ok(session) => session,
            Err(err) => {
                log::warn!("session init failed for {}: {}", event.responder, err);
                return Ok(None);
            }
        };

        sessions.save(session.clone())?;
        log::info!(
            "conversation {} established with {}",
            hex::encode(session.conversation_id),
            event.responder
        );

        Ok(Some((matched.pending_index, session)))
    }
}
