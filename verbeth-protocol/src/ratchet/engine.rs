//! Encrypt/decrypt operations and the entangled DH + chain + topic steps.

use thiserror::Error;

use crate::config::ProtocolConfig;
use crate::crypto::constant_time::eq_32;
use crate::crypto::encryption::{decrypt_with_aad, encrypt_with_aad, EncryptionError};
use crate::crypto::key_exchange::{self, KeyExchangeError};
use crate::crypto::signing::{self, SigningError};
use crate::crypto::kdf::{self, KdfError};
use crate::topics::{self, TopicError};

use super::skipped::{push_bounded, take_skipped, SkippedMessageKey};
use super::{RatchetHeader, RatchetSession, TopicMatch};

#[derive(Error, Debug)]
pub enum RatchetError {
    #[error("Chain not initialized")]
    NotInitialized,
    #[error("Too many skipped messages")]
    TooManySkipped,
    #[error("Message number already consumed")]
    Replayed,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Key exchange failed: {0}")]
    KeyExchange(#[from] KeyExchangeError),
    #[error("Key derivation failed: {0}")]
    Kdf(#[from] KdfError),
    #[error("Topic derivation failed: {0}")]
    Topic(#[from] TopicError),
    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),
}

pub type Result<T> = std::result::Result<T, RatchetError>;

/// Output of a successful encrypt: the advanced session plus everything the
/// caller needs to frame and submit the message
pub struct RatchetEncryptOutcome {
    pub session: RatchetSession,
    pub header: RatchetHeader,
    pub ciphertext: Vec<u8>,
    pub signature: [u8; 64],
    pub topic: [u8; 32],
}

/// Output of a successful decrypt
pub struct RatchetDecryptOutcome {
    pub session: RatchetSession,
    pub plaintext: Vec<u8>,
}

/// Encrypt a message, advancing the sending chain by one step
///
/// The caller MUST persist `outcome.session` before handing the payload to
/// any submitter; rolling back after a submission failure would mean reusing
/// a message key.
pub fn ratchet_encrypt(
    session: &RatchetSession,
    plaintext: &[u8],
    ed_signing_secret: &[u8; 32],
    config: &ProtocolConfig,
    now_ms: i64,
) -> Result<RatchetEncryptOutcome> {
    let mut sess = session.clone();

    if sess.sending_chain_key.is_none() {
        sending_ratchet_step(&mut sess, config, now_ms)?;
    }
    let chain = sess.sending_chain_key.ok_or(RatchetError::NotInitialized)?;
    let (next_chain, message_key) = kdf::chain_step(&chain)?;

    let header = RatchetHeader {
        dh: sess.dh_my_public,
        pn: sess.previous_chain_length,
        n: sess.sending_msg_number,
    };
    let header_bytes = header.to_bytes();
    let nonce = kdf::message_nonce(&header_bytes)?;

    let ciphertext = encrypt_with_aad(&message_key, &nonce, plaintext, &header_bytes)
        .map_err(|_| RatchetError::EncryptionFailed)?;

    let mut signed = header_bytes.to_vec();
    signed.extend_from_slice(&ciphertext);
    let signature = signing::sign_data(&signed, ed_signing_secret)?;

    sess.sending_chain_key = Some(next_chain);
    sess.sending_msg_number += 1;
    sess.updated_at = now_ms;

    Ok(RatchetEncryptOutcome {
        topic: sess.current_topic_outbound,
        header,
        ciphertext,
        signature,
        session: sess,
    })
}

/// Decrypt a message, performing DH and topic steps as needed
///
/// Pure: the input session is never touched. On any error the caller keeps
/// its stored session and observes no state change at all.
pub fn ratchet_decrypt(
    session: &RatchetSession,
    header: &RatchetHeader,
    ciphertext: &[u8],
    config: &ProtocolConfig,
    now_ms: i64,
) -> Result<RatchetDecryptOutcome> {
    let mut sess = session.clone();
    let header_bytes = header.to_bytes();
    let nonce = kdf::message_nonce(&header_bytes)?;

    // Late arrival on an already-passed chain position
    if let Some(message_key) = take_skipped(&mut sess.skipped_keys, &header.dh, header.n) {
        let plaintext = decrypt_with_aad(&message_key, &nonce, ciphertext, &header_bytes)
            .map_err(map_decrypt_err)?;
        sess.updated_at = now_ms;
        return Ok(RatchetDecryptOutcome {
            session: sess,
            plaintext,
        });
    }

    // Peer rotated its DH key: close out the old receiving chain, then step
    if !eq_32(&header.dh, &sess.dh_their_public) {
        stash_receiving_keys(&mut sess, header.pn, config, now_ms)?;
        dh_ratchet_step(&mut sess, &header.dh, config, now_ms)?;
    }

    if header.n < sess.receiving_msg_number {
        // Number consumed and no skipped key for it: a replay
        return Err(RatchetError::Replayed);
    }

    stash_receiving_keys(&mut sess, header.n, config, now_ms)?;

    let chain = sess.receiving_chain_key.ok_or(RatchetError::NotInitialized)?;
    let (next_chain, message_key) = kdf::chain_step(&chain)?;
    let plaintext = decrypt_with_aad(&message_key, &nonce, ciphertext, &header_bytes)
        .map_err(map_decrypt_err)?;

    sess.receiving_chain_key = Some(next_chain);
    sess.receiving_msg_number = header.n + 1;
    sess.updated_at = now_ms;

    Ok(RatchetDecryptOutcome {
        session: sess,
        plaintext,
    })
}

fn map_decrypt_err(_: EncryptionError) -> RatchetError {
    RatchetError::DecryptionFailed
}

/// Derive and stash message keys for `[receiving_msg_number, until)` on the
/// active receiving chain, keyed by the current peer DH key
fn stash_receiving_keys(
    sess: &mut RatchetSession,
    until: u32,
    config: &ProtocolConfig,
    now_ms: i64,
) -> Result<()> {
    let Some(mut chain) = sess.receiving_chain_key else {
        return Ok(());
    };
    if until <= sess.receiving_msg_number {
        return Ok(());
    }
    if until - sess.receiving_msg_number > config.max_skip_on_decrypt {
        return Err(RatchetError::TooManySkipped);
    }

    let keyed_dh = sess.dh_their_public;
    while sess.receiving_msg_number < until {
        let (next_chain, message_key) = kdf::chain_step(&chain)?;
        push_bounded(
            &mut sess.skipped_keys,
            SkippedMessageKey {
                dh_public: keyed_dh,
                msg_number: sess.receiving_msg_number,
                message_key,
                created_at: now_ms,
            },
            config.max_stored_skipped_keys,
        );
        chain = next_chain;
        sess.receiving_msg_number += 1;
    }
    sess.receiving_chain_key = Some(chain);

    Ok(())
}

/// Full DH ratchet step: receiving half, sending half, topic rotation
fn dh_ratchet_step(
    sess: &mut RatchetSession,
    their_new: &[u8; 32],
    config: &ProtocolConfig,
    now_ms: i64,
) -> Result<()> {
    // Receiving half: fold the peer's fresh key into the root chain
    let dh_in = key_exchange::derive_shared_secret(&sess.dh_my_secret, their_new)?;
    let (root_recv, receiving_chain) = kdf::ratchet_step(&sess.root_key, &dh_in)?;

    // Sending half: fresh local key against the same peer key
    let (my_public, my_secret) = key_exchange::generate_keypair();
    let dh_out = key_exchange::derive_shared_secret(&my_secret, their_new)?;
    let (root_send, sending_chain) = kdf::ratchet_step(&root_recv, &dh_out)?;

    sess.previous_chain_length = sess.sending_msg_number;
    sess.sending_msg_number = 0;
    sess.receiving_msg_number = 0;
    sess.dh_my_secret = my_secret;
    sess.dh_my_public = my_public;
    sess.dh_their_public = *their_new;
    sess.root_key = root_send;
    sess.receiving_chain_key = Some(receiving_chain);
    sess.sending_chain_key = Some(sending_chain);

    advance_topic_epoch(sess, &root_recv, &dh_in, &root_send, &dh_out, config, now_ms)
}

/// Topic ratchet, run once per DH step
///
/// The outbound topic derives from the receiving-half values: the peer
/// computed the same bytes at their own sending half, so they are already
/// listening there. The next-inbound hint derives from the sending-half
/// values and becomes real when the peer steps on our fresh key. The
/// current-inbound field only advances to the stored hint; the peer keeps
/// sending on their current outbound until they step.
fn advance_topic_epoch(
    sess: &mut RatchetSession,
    root_recv: &[u8; 32],
    dh_in: &[u8; 32],
    root_send: &[u8; 32],
    dh_out: &[u8; 32],
    config: &ProtocolConfig,
    now_ms: i64,
) -> Result<()> {
    let out_label = sess.outbound_label();

    sess.topic_epoch += 1;

    if let Some(next_inbound) = sess.next_topic_inbound {
        sess.previous_topic_inbound = Some(sess.current_topic_inbound);
        sess.previous_topic_expiry = Some(now_ms + config.topic_grace_ms);
        sess.current_topic_inbound = next_inbound;
    }
    sess.current_topic_outbound = topics::derive_topic(root_recv, dh_in, out_label)?;
    sess.next_topic_inbound = Some(topics::derive_topic(root_send, dh_out, out_label.flipped())?);
    sess.next_topic_outbound = Some(topics::derive_topic(root_send, dh_out, out_label)?);

    Ok(())
}

/// Sending-direction half step. Both init paths populate the sending chain,
/// so this only fires on a session restored from a state that predates them.
fn sending_ratchet_step(
    sess: &mut RatchetSession,
    _config: &ProtocolConfig,
    _now_ms: i64,
) -> Result<()> {
    let (my_public, my_secret) = key_exchange::generate_keypair();
    let dh_out = key_exchange::derive_shared_secret(&my_secret, &sess.dh_their_public)?;
    let (root_send, sending_chain) = kdf::ratchet_step(&sess.root_key, &dh_out)?;

    sess.previous_chain_length = sess.sending_msg_number;
    sess.sending_msg_number = 0;
    sess.dh_my_secret = my_secret;
    sess.dh_my_public = my_public;
    sess.root_key = root_send;
    sess.sending_chain_key = Some(sending_chain);

    sess.topic_epoch += 1;
    sess.current_topic_outbound =
        topics::derive_topic(&root_send, &dh_out, sess.outbound_label())?;

    Ok(())
}

/// O(1) inbound-topic dispatch: current, next, or grace-period previous
pub fn matches_session_topic(
    session: &RatchetSession,
    topic: &[u8; 32],
    now_ms: i64,
) -> Option<TopicMatch> {
    if eq_32(topic, &session.current_topic_inbound) {
        return Some(TopicMatch::Current);
    }
    if let Some(ref next) = session.next_topic_inbound {
        if eq_32(topic, next) {
            return Some(TopicMatch::Next);
        }
    }
    if let (Some(ref previous), Some(expiry)) =
        (&session.previous_topic_inbound, session.previous_topic_expiry)
    {
        if now_ms < expiry && eq_32(topic, previous) {
            return Some(TopicMatch::Previous);
        }
    }
    None
}

/// Drop expired skipped keys. The engine exposes this but never schedules it.
pub fn prune_expired_skipped_keys(
    session: &RatchetSession,
    now_ms: i64,
    ttl_ms: i64,
) -> (RatchetSession, usize) {
    let mut sess = session.clone();
    let removed = super::skipped::prune_expired(&mut sess.skipped_keys, now_ms, ttl_ms);
    if removed > 0 {
        sess.updated_at = now_ms;
    }
    (sess, removed)
}
