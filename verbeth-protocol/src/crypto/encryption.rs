use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::key_exchange;

/// Poly1305 authentication tag length
pub const AEAD_TAG_LEN: usize = 16;
/// XChaCha20 nonce length
pub const NONCE_LEN: usize = 24;
/// Sealed-box overhead: ephemeral public key + tag
pub const SEAL_OVERHEAD: usize = 32 + AEAD_TAG_LEN;

const SEAL_KEY_INFO: &[u8] = b"verbeth:seal:v1";
const SEAL_NONCE_INFO: &[u8] = b"verbeth:seal-nonce:v1";

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid input length")]
    InvalidInputLength,
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Encrypt with XChaCha20-Poly1305 under a caller-supplied nonce and AAD
///
/// Ratchet message keys are single-use, so the nonce is derived
/// deterministically from the header rather than drawn at random; both
/// parties compute the same value without transmitting it.
///
/// # Arguments
/// * `key` - 32-byte message key
/// * `nonce` - 24-byte nonce
/// * `plaintext` - Message body (may be empty)
/// * `aad` - Additional authenticated data (the serialized header)
pub fn encrypt_with_aad(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;

    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptionFailed)
}

/// Decrypt with XChaCha20-Poly1305 under a caller-supplied nonce and AAD
pub fn decrypt_with_aad(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < AEAD_TAG_LEN {
        return Err(EncryptionError::InvalidInputLength);
    }

    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;

    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptionFailed)
}

/// Seal a payload to an X25519 public key with an anonymous sender
///
/// A fresh ephemeral keypair is generated per seal; key and nonce are both
/// HKDF-derived from `DH(ephemeral, recipient)` salted with
/// `ephemeral_pub ‖ recipient_pub`. Nothing in the output identifies the
/// sender.
///
/// # Returns
/// `ephemeral_pub(32) ‖ ciphertext`
pub fn seal(recipient_public: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let (eph_public, eph_secret) = key_exchange::generate_keypair();
    let mut shared = key_exchange::derive_shared_secret(&eph_secret, recipient_public)
        .map_err(|_| EncryptionError::InvalidKeyLength)?;

    let (key, nonce) = seal_key_material(&shared, &eph_public, recipient_public)?;
    shared.zeroize();

    let ciphertext = encrypt_with_aad(&key, &nonce, plaintext, &[])?;

    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(&eph_public);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed payload with the recipient's X25519 secret key
pub fn open(recipient_secret: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(EncryptionError::InvalidInputLength);
    }

    let (eph_public_bytes, ciphertext) = sealed.split_at(32);
    let mut eph_public = [0u8; 32];
    eph_public.copy_from_slice(eph_public_bytes);

    let recipient_public = key_exchange::derive_public_key(recipient_secret)
        .map_err(|_| EncryptionError::InvalidKeyLength)?;
    let mut shared = key_exchange::derive_shared_secret(recipient_secret, &eph_public)
        .map_err(|_| EncryptionError::InvalidKeyLength)?;

    let (key, nonce) = seal_key_material(&shared, &eph_public, &recipient_public)?;
    shared.zeroize();

    decrypt_with_aad(&key, &nonce, ciphertext, &[])
}

fn seal_key_material(
    shared: &[u8; 32],
    eph_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<([u8; 32], [u8; NONCE_LEN])> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(eph_public);
    salt[32..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; 32];
    hkdf.expand(SEAL_KEY_INFO, &mut key)
        .map_err(|_| EncryptionError::EncryptionFailed)?;
    let mut nonce = [0u8; NONCE_LEN];
    hkdf.expand(SEAL_NONCE_INFO, &mut nonce)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    Ok((key, nonce))
}
