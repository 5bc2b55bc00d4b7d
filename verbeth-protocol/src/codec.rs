//! Binary framing for ratchet payloads and the auth-first signature gate.
//!
//! ```text
//! offset  len   field
//! 0       1     version (= 0x01)
//! 1       64    Ed25519 signature
//! 65      32    header.dh
//! 97      4     header.pn  (big-endian u32)
//! 101     4     header.n   (big-endian u32)
//! 105     ...   ciphertext (AEAD output, includes tag)
//! ```
//!
//! The signature covers `header_bytes ‖ ciphertext` and MUST be verified
//! before any ratchet state is touched: a forged payload with a plausible
//! header could otherwise force skipped-key allocation and fill the table.
//! The check is cheap and stateless.

use crate::crypto::signing;
use crate::ratchet::{RatchetHeader, HEADER_LEN};

/// Payload version byte
pub const RATCHET_PAYLOAD_VERSION: u8 = 0x01;
/// Minimum framed length: version + signature + header
pub const RATCHET_PAYLOAD_MIN_LEN: usize = 1 + 64 + HEADER_LEN;

/// A parsed ratchet payload
#[derive(Debug, Clone)]
pub struct RatchetPayload {
    pub signature: [u8; 64],
    pub header: RatchetHeader,
    pub ciphertext: Vec<u8>,
}

/// Frame a ratchet message for the log
pub fn encode_ratchet_payload(
    header: &RatchetHeader,
    signature: &[u8; 64],
    ciphertext: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(RATCHET_PAYLOAD_MIN_LEN + ciphertext.len());
    out.push(RATCHET_PAYLOAD_VERSION);
    out.extend_from_slice(signature);
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(ciphertext);
    out
}

/// Cheap shape check used by the ingress before parsing
pub fn is_ratchet_payload(bytes: &[u8]) -> bool {
    bytes.len() >= RATCHET_PAYLOAD_MIN_LEN && bytes[0] == RATCHET_PAYLOAD_VERSION
}

/// Strict parse; `None` on any length or version defect
pub fn parse_ratchet_payload(bytes: &[u8]) -> Option<RatchetPayload> {
    if !is_ratchet_payload(bytes) {
        return None;
    }

    let mut signature = [0u8; 64];
    signature.copy_from_slice(&bytes[1..65]);

    let header = RatchetHeader::from_bytes(&bytes[65..65 + HEADER_LEN])?;
    let ciphertext = bytes[RATCHET_PAYLOAD_MIN_LEN..].to_vec();

    Some(RatchetPayload {
        signature,
        header,
        ciphertext,
    })
}

/// Auth-first gate: verify the sender's signature over `header ‖ ciphertext`
pub fn verify_message_signature(payload: &RatchetPayload, sender_ed_pub: &[u8; 32]) -> bool {
    let mut signed = payload.header.to_bytes().to_vec();
    signed.extend_from_slice(&payload.ciphertext);

    signing::verify_signature(&signed, &payload.signature, sender_ed_pub).unwrap_or(false)
}
