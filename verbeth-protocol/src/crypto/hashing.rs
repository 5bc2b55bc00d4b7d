use sha3::{Digest, Keccak256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HashingError {
    #[error("Invalid hex string")]
    InvalidHex,
    #[error("Invalid length")]
    InvalidLength,
}

pub type Result<T> = std::result::Result<T, HashingError>;

/// Keccak-256 over arbitrary bytes (the EVM hash, not NIST SHA3-256)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 over the concatenation of two byte strings
pub fn keccak256_concat(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Recipient hash used to index handshake events on the log
///
/// # Arguments
/// * `address` - 0x-prefixed EVM address (any casing)
///
/// # Returns
/// `keccak256("contact:" ‖ lowercase(address))`
pub fn recipient_hash(address: &str) -> [u8; 32] {
    let lowered = address.to_ascii_lowercase();
    let mut hasher = Keccak256::new();
    hasher.update(b"contact:");
    hasher.update(lowered.as_bytes());
    hasher.finalize().into()
}

/// Lowercase 0x-prefixed hex encoding of a 32-byte value
pub fn to_hex_32(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a 32-byte value from hex, with or without the 0x prefix
pub fn from_hex_32(s: &str) -> Result<[u8; 32]> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let raw = hex::decode(stripped).map_err(|_| HashingError::InvalidHex)?;
    if raw.len() != 32 {
        return Err(HashingError::InvalidLength);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&raw);
    Ok(out)
}
