//! Outbound commit coordinator.
//!
//! Session advancement is persisted BEFORE transaction submission, never
//! after. Rolling back on a submission failure would mean reusing a message
//! key, so a failed slot is simply burned: the pending record goes to
//! `Failed`, the session stays advanced, and a retry is a brand-new message
//! at a strictly greater message number. The peer skips the gap through its
//! skipped-key store.
//!
//! Per conversation the coordinator keeps messages FIFO with one in-flight
//! submission at a time; distinct conversations are unconstrained.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use verbeth_protocol::codec::encode_ratchet_payload;
use verbeth_protocol::config::ProtocolConfig;
use verbeth_protocol::ratchet::{ratchet_encrypt, RatchetError, RatchetSession};

use crate::store::{PendingStore, SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("No session for conversation")]
    SessionNotFound,
    #[error("Ratchet failure: {0}")]
    Ratchet(#[from] RatchetError),
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
    #[error("Submission failed: {0}")]
    Submit(String),
}

pub type Result<T> = std::result::Result<T, OutboxError>;

/// Lifecycle of a pending outbound record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundStatus {
    Preparing,
    Submitted,
    Failed,
}

/// One prepared-but-unconfirmed message. Never mutated in place except for
/// `status` and `tx_hash`; deleted on confirmation or revert.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingOutbound {
    pub id: String,
    pub conversation_id: [u8; 32],
    pub topic: [u8; 32],
    pub payload: Vec<u8>,
    pub plaintext: String,
    pub session_before: RatchetSession,
    pub session_after: RatchetSession,
    pub created_at: i64,
    pub tx_hash: Option<String>,
    pub status: OutboundStatus,
}

/// External transaction submitter. Opaque; may be eventually consistent.
pub trait TransactionSubmitter {
    fn send_message(
        &mut self,
        payload: &[u8],
        topic: &[u8; 32],
        timestamp: u64,
        nonce: u64,
    ) -> anyhow::Result<String>;
}

/// What the caller needs to put a prepared message on the log
#[derive(Debug, Clone)]
pub struct PreparedOutbound {
    pub id: String,
    pub conversation_id: [u8; 32],
    pub topic: [u8; 32],
    pub payload: Vec<u8>,
}

/// Result of a confirmation or revert, carrying the next queued message (if
/// any) that just became eligible for submission
pub struct QueueAdvance {
    pub finished_id: String,
    pub conversation_id: [u8; 32],
    pub next: Option<PreparedOutbound>,
}

pub struct OutboundCoordinator {
    config: ProtocolConfig,
    signing_secret: [u8; 32],
    queues: HashMap<[u8; 32], VecDeque<String>>,
    in_flight: HashMap<[u8; 32], String>,
}

impl OutboundCoordinator {
    pub fn new(signing_secret: [u8; 32], config: ProtocolConfig) -> Self {
        Self {
            config,
            signing_secret,
            queues: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Queue a message. If the conversation has no in-flight submission the
    /// message is prepared immediately and returned; otherwise it waits its
    /// turn and `None` comes back.
    pub fn enqueue_message(
        &mut self,
        sessions: &mut dyn SessionStore,
        pendings: &mut dyn PendingStore,
        conversation_id: [u8; 32],
        plaintext: &str,
        now_ms: i64,
    ) -> Result<Option<PreparedOutbound>> {
        if self.in_flight.contains_key(&conversation_id) {
            self.queues
                .entry(conversation_id)
                .or_default()
                .push_back(plaintext.to_string());
            log::debug!(
                "conversation {} busy, queued message ({} waiting)",
                hex::encode(conversation_id),
                self.queues[&conversation_id].len()
            );
            return Ok(None);
        }

        let prepared = self.prepare_message(sessions, pendings, conversation_id, plaintext, now_ms)?;
        Ok(Some(prepared))
    }

    /// Encrypt, persist the advanced session, create the pending record.
    /// The session hits the store before the payload ever leaves this
    /// function, which is the two-phase-commit half the engine owns.
    pub fn prepare_message(
        &mut self,
        sessions: &mut dyn SessionStore,
        pendings: &mut dyn PendingStore,
        conversation_id: [u8; 32],
        plaintext: &str,
        now_ms: i64,
    ) -> Result<PreparedOutbound> {
        let session = sessions
            .get_by_conversation_id(&conversation_id)?
            .ok_or(OutboxError::SessionNotFound)?;

        let outcome = ratchet_encrypt(
            &session,
            plaintext.as_bytes(),
            &self.signing_secret,
            &self.config,
            now_ms,
        )?;
        let payload =
            encode_ratchet_payload(&outcome.header, &outcome.signature, &outcome.ciphertext);

        sessions.save(outcome.session.clone())?;

        let id = Uuid::new_v4().to_string();
        pendings.create(PendingOutbound {
            id: id.clone(),
            conversation_id,
            topic: outcome.topic,
            payload: payload.clone(),
            plaintext: plaintext.to_string(),
            session_before: session,
            session_after: outcome.session,
            created_at: now_ms,
            tx_hash: None,
            status: OutboundStatus::Preparing,
        })?;

        self.in_flight.insert(conversation_id, id.clone());
        log::info!(
            "prepared outbound {} for conversation {} at slot {}",
            id,
            hex::encode(conversation_id),
            outcome.header.n
        );

        Ok(PreparedOutbound {
            id,
            conversation_id,
            topic: outcome.topic,
            payload,
        })
    }

    /// Prepare and hand straight to the submitter. On submitter failure the
    /// record flips to `Failed` and the slot stays burned; the error is
    /// returned for the caller's retry policy.
    pub fn send_message(
        &mut self,
        sessions: &mut dyn SessionStore,
        pendings: &mut dyn PendingStore,
        submitter: &mut dyn TransactionSubmitter,
        conversation_id: [u8; 32],
        plaintext: &str,
        now_ms: i64,
        nonce: u64,
    ) -> Result<Option<PreparedOutbound>> {
        let Some(prepared) =
            self.enqueue_message(sessions, pendings, conversation_id, plaintext, now_ms)?
        else {
            return Ok(None);
        };

        self.submit_prepared(pendings, submitter, &prepared, now_ms, nonce)?;
        Ok(Some(prepared))
    }

    /// Submit one prepared message and record the tx hash
    pub fn submit_prepared(
        &mut self,
        pendings: &mut dyn PendingStore,
        submitter: &mut dyn TransactionSubmitter,
        prepared: &PreparedOutbound,
        now_ms: i64,
        nonce: u64,
    ) -> Result<()> {
        match submitter.send_message(
            &prepared.payload,
            &prepared.topic,
            (now_ms / 1000) as u64,
            nonce,
        ) {
            Ok(tx_hash) => {
                pendings.mark_submitted(&prepared.id, &tx_hash)?;
                log::info!("outbound {} submitted as {}", prepared.id, tx_hash);
                Ok(())
            }
            Err(err) => {
                pendings.mark_failed(&prepared.id)?;
                self.in_flight.remove(&prepared.conversation_id);
                log::warn!(
                    "outbound {} submission failed, slot burned: {}",
                    prepared.id,
                    err
                );
                Err(OutboxError::Submit(err.to_string()))
            }
        }
    }

    /// A submitted transaction confirmed: drop the record (the session was
    /// committed at prepare time) and surface the next queued message.
    pub fn confirm_tx(
        &mut self,
        sessions: &mut dyn SessionStore,
        pendings: &mut dyn PendingStore,
        tx_hash: &str,
        now_ms: i64,
    ) -> Result<Option<QueueAdvance>> {
        let Some(record) = pendings.get_by_tx_hash(tx_hash)? else {
            return Ok(None);
        };
        pendings.finalize(&record.id)?;
        log::info!("outbound {} confirmed ({})", record.id, tx_hash);

        self.advance_queue(sessions, pendings, record, now_ms).map(Some)
    }

    /// A submitted transaction reverted or was permanently dropped: delete
    /// the record. The session remains advanced; the peer will skip over the
    /// burned slot when the next successful message arrives.
    pub fn revert_tx(
        &mut self,
        sessions: &mut dyn SessionStore,
        pendings: &mut dyn PendingStore,
        tx_hash: &str,
        now_ms: i64,
    ) -> Result<Option<QueueAdvance>> {
        let Some(record) = pendings.get_by_tx_hash(tx_hash)? else {
            return Ok(None);
        };
        pendings.delete(&record.id)?;
        log::warn!(
            "outbound {} reverted ({}), slot {} burned",
            record.id,
            tx_hash,
            record.session_before.sending_msg_number
        );

        self.advance_queue(sessions, pendings, record, now_ms).map(Some)
    }

    fn advance_queue(
        &mut self,
        sessions: &mut dyn SessionStore,
        pendings: &mut dyn PendingStore,
        finished: PendingOutbound,
        now_ms: i64,
    ) -> Result<QueueAdvance> {
        let conversation_id = finished.conversation_id;
        self.in_flight.remove(&conversation_id);

        let next_plaintext = self
            .queues
            .get_mut(&conversation_id)
            .and_then(|q| q.pop_front());

        let next = match next_plaintext {
            Some(plaintext) => Some(self.prepare_message(
                sessions,
                pendings,
                conversation_id,
                &plaintext,
                now_ms,
            )?),
            None => None,
        };

        Ok(QueueAdvance {
            finished_id: finished.id,
            conversation_id,
            next,
        })
    }

    /// Messages still waiting behind the in-flight one
    pub fn queued_len(&self, conversation_id: &[u8; 32]) -> usize {
        self.queues.get(conversation_id).map_or(0, |q| q.len())
    }
}
