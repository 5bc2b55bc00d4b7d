//! Post-Quantum KEM: ML-KEM-768 (NIST FIPS 203)
//!
//! Handshakes are hybrid: X25519 for the classical share, ML-KEM-768 for the
//! post-quantum share, combined downstream by the KDF layer. This module only
//! wraps the FIPS 203 primitive behind byte-slice APIs.
//!
//! Key sizes (ML-KEM-768):
//! - Encapsulation key (public):  1184 bytes
//! - Decapsulation key (secret):  2400 bytes
//! - Ciphertext:                  1088 bytes
//! - Shared secret:               32 bytes

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Encoded, EncodedSizeUser, KemCore, MlKem768, MlKem768Params};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroize;

/// ML-KEM-768 encapsulation key (public) size in bytes
pub const MLKEM768_EK_BYTES: usize = 1184;
/// ML-KEM-768 decapsulation key (secret) size in bytes
pub const MLKEM768_DK_BYTES: usize = 2400;
/// ML-KEM-768 ciphertext size in bytes
pub const MLKEM768_CT_BYTES: usize = 1088;
/// ML-KEM shared secret size in bytes
pub const MLKEM_SS_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum PqcError {
    #[error("ML-KEM encapsulation failed")]
    EncapsulateFailed,
    #[error("ML-KEM decapsulation failed")]
    DecapsulateFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid ciphertext length")]
    InvalidCiphertextLength,
}

pub type Result<T> = std::result::Result<T, PqcError>;

/// An ML-KEM-768 keypair held as raw encoded bytes
#[derive(Clone)]
pub struct KemKeyPair {
    /// Encapsulation key (1184 bytes)
    pub public: Vec<u8>,
    /// Decapsulation key (2400 bytes)
    pub secret: Vec<u8>,
}

impl Drop for KemKeyPair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Generate a fresh ML-KEM-768 keypair
pub fn generate_keypair() -> KemKeyPair {
    let (dk, ek) = MlKem768::generate(&mut OsRng);

    KemKeyPair {
        public: ek.as_bytes().to_vec(),
        secret: dk.as_bytes().to_vec(),
    }
}

/// Encapsulate to a recipient's encapsulation key
///
/// # Arguments
/// * `their_public` - Recipient's ML-KEM-768 encapsulation key (1184 bytes)
///
/// # Returns
/// (ciphertext, shared_secret)
pub fn encapsulate(their_public: &[u8]) -> Result<(Vec<u8>, [u8; MLKEM_SS_BYTES])> {
    if their_public.len() != MLKEM768_EK_BYTES {
        return Err(PqcError::InvalidKeyLength);
    }

    let ek_encoded =
        Encoded::<ml_kem::kem::EncapsulationKey<MlKem768Params>>::try_from(their_public)
            .map_err(|_| PqcError::InvalidKeyLength)?;
    let ek = ml_kem::kem::EncapsulationKey::<MlKem768Params>::from_bytes(&ek_encoded);

    let (ct, ss) = ek
        .encapsulate(&mut OsRng)
        .map_err(|_| PqcError::EncapsulateFailed)?;

    let mut shared = [0u8; MLKEM_SS_BYTES];
    shared.copy_from_slice(ss.as_ref());

    Ok((ct.iter().copied().collect(), shared))
}

/// Decapsulate a ciphertext with our decapsulation key
///
/// # Arguments
/// * `ciphertext` - ML-KEM-768 ciphertext (1088 bytes)
/// * `our_secret` - Our decapsulation key (2400 bytes)
///
/// # Returns
/// 32-byte shared secret
pub fn decapsulate(ciphertext: &[u8], our_secret: &[u8]) -> Result<[u8; MLKEM_SS_BYTES]> {
    if ciphertext.len() != MLKEM768_CT_BYTES {
        return Err(PqcError::InvalidCiphertextLength);
    }
    if our_secret.len() != MLKEM768_DK_BYTES {
        return Err(PqcError::InvalidKeyLength);
    }

    let dk_encoded = Encoded::<ml_kem::kem::DecapsulationKey<MlKem768Params>>::try_from(our_secret)
        .map_err(|_| PqcError::InvalidKeyLength)?;
    let dk = ml_kem::kem::DecapsulationKey::<MlKem768Params>::from_bytes(&dk_encoded);

    let ct = ml_kem::Ciphertext::<MlKem768>::try_from(ciphertext)
        .map_err(|_| PqcError::InvalidCiphertextLength)?;

    let ss = dk
        .decapsulate(&ct)
        .map_err(|_| PqcError::DecapsulateFailed)?;

    let mut shared = [0u8; MLKEM_SS_BYTES];
    shared.copy_from_slice(ss.as_ref());

    Ok(shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sizes() {
        let kp = generate_keypair();
        assert_eq!(kp.public.len(), MLKEM768_EK_BYTES);
        assert_eq!(kp.secret.len(), MLKEM768_DK_BYTES);
    }

    #[test]
    fn test_encapsulate_decapsulate_roundtrip() {
        let kp = generate_keypair();

        let (ct, ss_enc) = encapsulate(&kp.public).unwrap();
        assert_eq!(ct.len(), MLKEM768_CT_BYTES);

        let ss_dec = decapsulate(&ct, &kp.secret).unwrap();
        assert_eq!(ss_enc, ss_dec);
    }

    #[test]
    fn test_wrong_secret_yields_different_share() {
        let kp1 = generate_keypair();
        let kp2 = generate_keypair();

        let (ct, ss_enc) = encapsulate(&kp1.public).unwrap();
        // Implicit rejection: decapsulation with the wrong key still returns
        // 32 bytes, just not the encapsulated secret
        let ss_dec = decapsulate(&ct, &kp2.secret).unwrap();
        assert_ne!(ss_enc, ss_dec);
    }

    #[test]
    fn test_invalid_lengths_rejected() {
        let kp = generate_keypair();
        assert!(encapsulate(&kp.public[..100]).is_err());

        let (ct, _) = encapsulate(&kp.public).unwrap();
        assert!(decapsulate(&ct[..50], &kp.secret).is_err());
        assert!(decapsulate(&ct, &kp.secret[..100]).is_err());
    }
}
