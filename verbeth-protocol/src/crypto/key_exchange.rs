use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Error, Debug)]
pub enum KeyExchangeError {
    #[error("Invalid key length")]
    InvalidKeyLength,
}

pub type Result<T> = std::result::Result<T, KeyExchangeError>;

/// Generate an X25519 keypair
///
/// # Returns
/// (public_key, secret_key) - Both as 32-byte arrays
///
/// Secrets are `StaticSecret`s throughout: handshake ephemerals must be
/// persisted until a matching response arrives, and ratchet keys survive a
/// whole epoch.
pub fn generate_keypair() -> ([u8; 32], [u8; 32]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    (public.to_bytes(), secret.to_bytes())
}

/// Derive shared secret using X25519
///
/// # Arguments
/// * `our_secret_key` - Our 32-byte X25519 secret key
/// * `their_public_key` - Their 32-byte X25519 public key
///
/// # Returns
/// 32-byte shared secret
pub fn derive_shared_secret(
    our_secret_key: &[u8],
    their_public_key: &[u8],
) -> Result<[u8; 32]> {
    if our_secret_key.len() != 32 || their_public_key.len() != 32 {
        return Err(KeyExchangeError::InvalidKeyLength);
    }

    let mut secret_bytes = [0u8; 32];
    secret_bytes.copy_from_slice(our_secret_key);
    let secret = StaticSecret::from(secret_bytes);

    let mut public_bytes = [0u8; 32];
    public_bytes.copy_from_slice(their_public_key);
    let public = PublicKey::from(public_bytes);

    let shared_secret = secret.diffie_hellman(&public);

    Ok(shared_secret.to_bytes())
}

/// Derive the public key for a 32-byte X25519 secret key
pub fn derive_public_key(secret_key: &[u8]) -> Result<[u8; 32]> {
    if secret_key.len() != 32 {
        return Err(KeyExchangeError::InvalidKeyLength);
    }

    let mut secret_bytes = [0u8; 32];
    secret_bytes.copy_from_slice(secret_key);
    let secret = StaticSecret::from(secret_bytes);
    let public = PublicKey::from(&secret);

    Ok(public.to_bytes())
}
