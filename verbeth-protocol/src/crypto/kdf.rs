//! Key derivation for the root chain, message chains and handshake binding.
//!
//! Every derivation is HKDF-SHA256 under a distinct info string; nothing is
//! reused across purposes. Info strings are versioned and fixed; changing
//! one is a wire-format break.

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::encryption::NONCE_LEN;

const INFO_HYBRID_INIT: &[u8] = b"verbeth:hybrid-init:v1";
const INFO_ROOT_INIT: &[u8] = b"verbeth:root-init:v1";
const INFO_RATCHET: &[u8] = b"verbeth:ratchet:v1";
const INFO_CHAIN: &[u8] = b"verbeth:chain:v1";
const INFO_HYBRID_TAG: &[u8] = b"verbeth:hybrid-tag:v1";
const INFO_NONCE: &[u8] = b"verbeth:nonce:v1";

#[derive(Error, Debug)]
pub enum KdfError {
    #[error("HKDF expansion failed")]
    ExpansionFailed,
}

pub type Result<T> = std::result::Result<T, KdfError>;

fn expand_64(ikm: &[u8], info: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; 64];
    hkdf.expand(info, &mut okm)
        .map_err(|_| KdfError::ExpansionFailed)?;

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    okm.zeroize();

    Ok((first, second))
}

fn expand_32(ikm: &[u8], info: &[u8]) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; 32];
    hkdf.expand(info, &mut okm)
        .map_err(|_| KdfError::ExpansionFailed)?;
    Ok(okm)
}

/// Combine the classical and post-quantum shared secrets into the session seed
///
/// The result is secret as long as EITHER X25519 OR ML-KEM-768 holds up.
pub fn hybrid_initial_secret(dh_shared: &[u8; 32], kem_shared: &[u8; 32]) -> Result<[u8; 32]> {
    let mut ikm = [0u8; 64];
    ikm[..32].copy_from_slice(dh_shared);
    ikm[32..].copy_from_slice(kem_shared);

    let out = expand_32(&ikm, INFO_HYBRID_INIT);
    ikm.zeroize();
    out
}

/// Derive the initial root key and epoch-0 chain key from the session seed
///
/// # Returns
/// (root_key, chain_key)
pub fn root_init(seed: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
    expand_64(seed, INFO_ROOT_INIT)
}

/// Root KDF step: fold a DH output into the root chain
///
/// # Arguments
/// * `root_key` - Current 32-byte root key
/// * `dh_output` - 32-byte X25519 shared secret from the ratchet step
///
/// # Returns
/// (new_root_key, chain_key)
pub fn ratchet_step(root_key: &[u8; 32], dh_output: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
    let mut ikm = [0u8; 64];
    ikm[..32].copy_from_slice(root_key);
    ikm[32..].copy_from_slice(dh_output);

    let out = expand_64(&ikm, INFO_RATCHET);
    ikm.zeroize();
    out
}

/// Chain KDF step: advance a chain key and derive the per-message key
///
/// One-way: old chain keys cannot be recovered from new ones.
///
/// # Returns
/// (new_chain_key, message_key)
pub fn chain_step(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
    expand_64(chain_key, INFO_CHAIN)
}

/// Hybrid tag binding a handshake response to one pending initiator contact
///
/// Both sides feed the same ephemeral DH and KEM shared secrets: the
/// responder before emitting, the initiator after decrypting the response.
pub fn hybrid_tag(dh_shared: &[u8; 32], kem_shared: &[u8; 32]) -> Result<[u8; 32]> {
    let mut ikm = [0u8; 64];
    ikm[..32].copy_from_slice(dh_shared);
    ikm[32..].copy_from_slice(kem_shared);

    let out = expand_32(&ikm, INFO_HYBRID_TAG);
    ikm.zeroize();
    out
}

/// Deterministic AEAD nonce for a ratchet message, derived from its header
pub fn message_nonce(header_bytes: &[u8]) -> Result<[u8; NONCE_LEN]> {
    let hkdf = Hkdf::<Sha256>::new(None, header_bytes);
    let mut nonce = [0u8; NONCE_LEN];
    hkdf.expand(INFO_NONCE, &mut nonce)
        .map_err(|_| KdfError::ExpansionFailed)?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_init_split_is_distinct() {
        let (root, chain) = root_init(&[0x11u8; 32]).unwrap();
        assert_ne!(root, chain);
    }

    #[test]
    fn test_ratchet_step_deterministic() {
        let root = [0x22u8; 32];
        let dh = [0x33u8; 32];
        let a = ratchet_step(&root, &dh).unwrap();
        let b = ratchet_step(&root, &dh).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ratchet_step_sensitive_to_both_inputs() {
        let root = [0x22u8; 32];
        let dh = [0x33u8; 32];
        let base = ratchet_step(&root, &dh).unwrap();

        let mut root2 = root;
        root2[0] ^= 1;
        assert_ne!(base, ratchet_step(&root2, &dh).unwrap());

        let mut dh2 = dh;
        dh2[31] ^= 1;
        assert_ne!(base, ratchet_step(&root, &dh2).unwrap());
    }

    #[test]
    fn test_chain_step_distinct_outputs() {
        let (next_chain, message_key) = chain_step(&[0x44u8; 32]).unwrap();
        assert_ne!(next_chain, message_key);
    }

    #[test]
    fn test_hybrid_tag_differs_from_initial_secret() {
        let dh = [0x55u8; 32];
        let kem = [0x66u8; 32];
        // Same inputs, different domains: the tag must not equal the seed
        let tag = hybrid_tag(&dh, &kem).unwrap();
        let seed = hybrid_initial_secret(&dh, &kem).unwrap();
        assert_ne!(tag, seed);
    }

    #[test]
    fn test_hybrid_initial_secret_binds_kem_share() {
        let dh = [0x55u8; 32];
        let kem = [0x66u8; 32];
        let seed = hybrid_initial_secret(&dh, &kem).unwrap();

        let mut kem2 = kem;
        kem2[7] ^= 1;
        assert_ne!(seed, hybrid_initial_secret(&dh, &kem2).unwrap());
    }

    #[test]
    fn test_message_nonce_tracks_header() {
        let a = message_nonce(b"header-a").unwrap();
        let b = message_nonce(b"header-b").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, message_nonce(b"header-a").unwrap());
    }
}
