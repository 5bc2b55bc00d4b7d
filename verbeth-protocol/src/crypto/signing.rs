use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid signature length")]
    InvalidSignature,
}

pub type Result<T> = std::result::Result<T, SigningError>;

/// Derive an Ed25519 keypair from a 32-byte seed
///
/// Identity signing keys are deterministic: the seed comes out of the
/// wallet-signature HKDF, so the same wallet always yields the same keys.
///
/// # Returns
/// (public_key, secret_key) - Both as 32-byte arrays
pub fn keypair_from_seed(seed: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let signing_key = SigningKey::from_bytes(seed);
    (signing_key.verifying_key().to_bytes(), signing_key.to_bytes())
}

/// Sign data with an Ed25519 secret key
///
/// # Arguments
/// * `data` - Data to sign
/// * `secret_key` - 32-byte Ed25519 secret key
///
/// # Returns
/// 64-byte signature
pub fn sign_data(data: &[u8], secret_key: &[u8]) -> Result<[u8; 64]> {
    if secret_key.len() != 32 {
        return Err(SigningError::InvalidKeyLength);
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(secret_key);
    let signing_key = SigningKey::from_bytes(&key_bytes);

    let signature = signing_key.sign(data);

    Ok(signature.to_bytes())
}

/// Verify an Ed25519 signature
///
/// Returns `Ok(false)` on a bad signature; `Err` only for malformed inputs.
pub fn verify_signature(data: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
    if public_key.len() != 32 {
        return Err(SigningError::InvalidKeyLength);
    }
    if signature.len() != 64 {
        return Err(SigningError::InvalidSignature);
    }

    let mut pub_bytes = [0u8; 32];
    pub_bytes.copy_from_slice(public_key);
    let verifying_key = match VerifyingKey::from_bytes(&pub_bytes) {
        Ok(k) => k,
        Err(_) => return Ok(false),
    };

    let mut sig_bytes = [0u8; 64];
    sig_bytes.copy_from_slice(signature);
    let sig = Signature::from_bytes(&sig_bytes);

    Ok(verifying_key.verify(data, &sig).is_ok())
}
