//! Long-term identity: an X25519 + Ed25519 keypair deterministically derived
//! from two wallet signatures, bound to the wallet address by a signed
//! binding message.

pub mod binding;

use hkdf::Hkdf;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::hashing::keccak256;
use crate::crypto::signing;

pub use binding::{build_binding_message, parse_binding_message, BindingFields};

const INFO_ID_X25519: &[u8] = b"verbeth:id-x25519:v1";
const INFO_ID_ED25519: &[u8] = b"verbeth:id-ed25519:v1";

/// Unified public-key blob length: version byte + X25519 + Ed25519
pub const UNIFIED_PUB_KEYS_LEN: usize = 65;
const UNIFIED_PUB_KEYS_VERSION: u8 = 0x01;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Wallet signer failed: {0}")]
    Signer(String),
    #[error("HKDF expansion failed")]
    KeyDerivationFailed,
    #[error("Invalid unified public-key blob")]
    InvalidUnifiedKeys,
}

pub type Result<T> = std::result::Result<T, IdentityError>;

/// A wallet capable of signing arbitrary messages (EOA or smart account).
/// External collaborator; the core never sees private wallet material.
pub trait MessageSigner {
    fn sign_message(&self, message: &str) -> Result<Vec<u8>>;
}

/// Signature-on-arbitrary-message verification oracle. Owns the EOA /
/// ERC-1271 / ERC-6492 nuances; the core treats it as a pure predicate.
pub trait MessageSignatureVerifier {
    fn verify_message_signature(&self, address: &str, message: &str, signature: &[u8]) -> bool;
}

/// Long-term identity keypair. Derived once per address, never mutated.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityKeyPair {
    pub x25519_public: [u8; 32],
    pub x25519_secret: [u8; 32],
    pub ed_public: [u8; 32],
    pub ed_secret: [u8; 32],
}

impl Drop for IdentityKeyPair {
    fn drop(&mut self) {
        self.x25519_secret.zeroize();
        self.ed_secret.zeroize();
    }
}

impl IdentityKeyPair {
    /// 65-byte unified public-key blob: `0x01 ‖ pkX25519 ‖ pkEd25519`
    pub fn unified_pub_keys(&self) -> [u8; UNIFIED_PUB_KEYS_LEN] {
        let mut out = [0u8; UNIFIED_PUB_KEYS_LEN];
        out[0] = UNIFIED_PUB_KEYS_VERSION;
        out[1..33].copy_from_slice(&self.x25519_public);
        out[33..65].copy_from_slice(&self.ed_public);
        out
    }
}

/// Split a unified public-key blob into (x25519_pub, ed_pub)
pub fn parse_unified_pub_keys(blob: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    if blob.len() != UNIFIED_PUB_KEYS_LEN || blob[0] != UNIFIED_PUB_KEYS_VERSION {
        return Err(IdentityError::InvalidUnifiedKeys);
    }

    let mut x25519_pub = [0u8; 32];
    let mut ed_pub = [0u8; 32];
    x25519_pub.copy_from_slice(&blob[1..33]);
    ed_pub.copy_from_slice(&blob[33..65]);
    Ok((x25519_pub, ed_pub))
}

/// Binding-message context pinned at derivation time
#[derive(Debug, Clone)]
pub struct BindingContext {
    pub chain_id: u64,
    pub rp_id: String,
}

/// Constraints applied when verifying a binding; `None` fields are not checked
#[derive(Debug, Clone, Default)]
pub struct BindingExpectations {
    pub chain_id: Option<u64>,
    pub rp_id: Option<String>,
}

/// Identity proof: the binding message plus the wallet's signature over it.
/// Opaque to the core; consumed by the verification oracle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityProof {
    pub binding_message: String,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// serde helper: byte strings as base64 text (wallet signatures vary in
/// length across EOA / 1271 / 6492 signers)
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

fn derivation_message(address: &str, key_kind: &str) -> String {
    format!(
        "VerbEth Identity Derivation v1\naddress: {}\nkey: {}\ncontext: verbeth",
        address.to_ascii_lowercase(),
        key_kind
    )
}

/// Derive the long-term identity from two wallet signatures
///
/// Two signatures over distinct domain-separated messages yield 64 bytes of
/// entropy (`keccak(sig1) ‖ keccak(sig2)`); X25519 and Ed25519 secrets come
/// out of HKDF over that entropy via a deterministic RNG, so the same wallet
/// always reproduces the same identity.
///
/// # Returns
/// (keypair, proof); the proof carries the signed binding message
pub fn derive_identity(
    signer: &dyn MessageSigner,
    address: &str,
    ctx: &BindingContext,
) -> Result<(IdentityKeyPair, IdentityProof)> {
    let sig_x = signer.sign_message(&derivation_message(address, "x25519"))?;
    let sig_ed = signer.sign_message(&derivation_message(address, "ed25519"))?;

    let mut entropy = [0u8; 64];
    entropy[..32].copy_from_slice(&keccak256(&sig_x));
    entropy[32..].copy_from_slice(&keccak256(&sig_ed));

    let hkdf = Hkdf::<Sha256>::new(None, &entropy);
    let mut x_rng_seed = [0u8; 32];
    hkdf.expand(INFO_ID_X25519, &mut x_rng_seed)
        .map_err(|_| IdentityError::KeyDerivationFailed)?;
    let mut ed_rng_seed = [0u8; 32];
    hkdf.expand(INFO_ID_ED25519, &mut ed_rng_seed)
        .map_err(|_| IdentityError::KeyDerivationFailed)?;
    entropy.zeroize();

    let mut x_seed = [0u8; 32];
    ChaCha20Rng::from_seed(x_rng_seed).fill_bytes(&mut x_seed);
    x_rng_seed.zeroize();
    let x25519_secret = StaticSecret::from(x_seed);
    let x25519_public = PublicKey::from(&x25519_secret);
    x_seed.zeroize();

    let mut ed_seed = [0u8; 32];
    ChaCha20Rng::from_seed(ed_rng_seed).fill_bytes(&mut ed_seed);
    ed_rng_seed.zeroize();
    let (ed_public, ed_secret) = signing::keypair_from_seed(&ed_seed);
    ed_seed.zeroize();

    let keypair = IdentityKeyPair {
        x25519_public: x25519_public.to_bytes(),
        x25519_secret: x25519_secret.to_bytes(),
        ed_public,
        ed_secret,
    };

    let binding_message = build_binding_message(
        address,
        &keypair.x25519_public,
        &keypair.ed_public,
        ctx,
    );
    let signature = signer.sign_message(&binding_message)?;

    Ok((
        keypair,
        IdentityProof {
            binding_message,
            signature,
        },
    ))
}

/// Verify an identity proof against an address and the expected public keys
///
/// Delegates the signature check to the external oracle, then parses the
/// binding message and asserts every field. Any protocol-level mismatch
/// returns `false`; this function never errors.
pub fn verify_identity_proof(
    verifier: &dyn MessageSignatureVerifier,
    proof: &IdentityProof,
    address: &str,
    expected_x25519_pub: &[u8; 32],
    expected_ed_pub: &[u8; 32],
    expectations: &BindingExpectations,
) -> bool {
    if !verifier.verify_message_signature(address, &proof.binding_message, &proof.signature) {
        return false;
    }

    let fields = match parse_binding_message(&proof.binding_message) {
        Some(f) => f,
        None => return false,
    };

    fields.matches(address, expected_x25519_pub, expected_ed_pub, expectations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StubSigner, StubVerifier};

    fn test_ctx() -> BindingContext {
        BindingContext {
            chain_id: 8453,
            rp_id: "verbeth.xyz".to_string(),
        }
    }

    const ADDR: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[test]
    fn test_derive_identity_deterministic() {
        let signer = StubSigner { key: [1u8; 32] };
        let (kp1, _) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();
        let (kp2, _) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();

        assert_eq!(kp1.x25519_public, kp2.x25519_public);
        assert_eq!(kp1.x25519_secret, kp2.x25519_secret);
        assert_eq!(kp1.ed_public, kp2.ed_public);
        assert_eq!(kp1.ed_secret, kp2.ed_secret);
    }

    #[test]
    fn test_different_wallets_different_identities() {
        let (kp1, _) = derive_identity(&StubSigner { key: [1u8; 32] }, ADDR, &test_ctx()).unwrap();
        let (kp2, _) = derive_identity(&StubSigner { key: [2u8; 32] }, ADDR, &test_ctx()).unwrap();

        assert_ne!(kp1.x25519_public, kp2.x25519_public);
        assert_ne!(kp1.ed_public, kp2.ed_public);
    }

    #[test]
    fn test_encryption_and_signing_keys_independent() {
        let (kp, _) = derive_identity(&StubSigner { key: [3u8; 32] }, ADDR, &test_ctx()).unwrap();
        assert_ne!(kp.x25519_secret, kp.ed_secret);
        assert_ne!(kp.x25519_public, kp.ed_public);
    }

    #[test]
    fn test_unified_pub_keys_roundtrip() {
        let (kp, _) = derive_identity(&StubSigner { key: [4u8; 32] }, ADDR, &test_ctx()).unwrap();

        let blob = kp.unified_pub_keys();
        assert_eq!(blob.len(), UNIFIED_PUB_KEYS_LEN);
        assert_eq!(blob[0], 0x01);

        let (x_pub, ed_pub) = parse_unified_pub_keys(&blob).unwrap();
        assert_eq!(x_pub, kp.x25519_public);
        assert_eq!(ed_pub, kp.ed_public);
    }

    #[test]
    fn test_parse_unified_rejects_bad_version() {
        let mut blob = [0u8; UNIFIED_PUB_KEYS_LEN];
        blob[0] = 0x02;
        assert!(parse_unified_pub_keys(&blob).is_err());
        assert!(parse_unified_pub_keys(&blob[..64]).is_err());
    }

    #[test]
    fn test_verify_identity_proof_accepts_valid() {
        let signer = StubSigner { key: [5u8; 32] };
        let (kp, proof) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();

        let verifier = StubVerifier { key: [5u8; 32] };
        assert!(verify_identity_proof(
            &verifier,
            &proof,
            ADDR,
            &kp.x25519_public,
            &kp.ed_public,
            &BindingExpectations {
                chain_id: Some(8453),
                rp_id: Some("verbeth.xyz".to_string()),
            },
        ));
    }

    #[test]
    fn test_verify_identity_proof_rejects_wrong_keys() {
        let signer = StubSigner { key: [6u8; 32] };
        let (kp, proof) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();

        let verifier = StubVerifier { key: [6u8; 32] };
        let mut wrong = kp.x25519_public;
        wrong[0] ^= 1;
        assert!(!verify_identity_proof(
            &verifier,
            &proof,
            ADDR,
            &wrong,
            &kp.ed_public,
            &BindingExpectations::default(),
        ));
    }

    #[test]
    fn test_verify_identity_proof_rejects_wrong_address() {
        let signer = StubSigner { key: [7u8; 32] };
        let (kp, proof) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();

        let verifier = StubVerifier { key: [7u8; 32] };
        assert!(!verify_identity_proof(
            &verifier,
            &proof,
            "0x0000000000000000000000000000000000000bad",
            &kp.x25519_public,
            &kp.ed_public,
            &BindingExpectations::default(),
        ));
    }

    #[test]
    fn test_verify_identity_proof_rejects_bad_signature() {
        let signer = StubSigner { key: [8u8; 32] };
        let (kp, mut proof) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();
        proof.signature[0] ^= 1;

        let verifier = StubVerifier { key: [8u8; 32] };
        assert!(!verify_identity_proof(
            &verifier,
            &proof,
            ADDR,
            &kp.x25519_public,
            &kp.ed_public,
            &BindingExpectations::default(),
        ));
    }

    #[test]
    fn test_verify_identity_proof_rejects_chain_mismatch() {
        let signer = StubSigner { key: [9u8; 32] };
        let (kp, proof) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();

        let verifier = StubVerifier { key: [9u8; 32] };
        assert!(!verify_identity_proof(
            &verifier,
            &proof,
            ADDR,
            &kp.x25519_public,
            &kp.ed_public,
            &BindingExpectations {
                chain_id: Some(1),
                rp_id: None,
            },
        ));
    }

    #[test]
    fn test_identity_proof_json_roundtrip() {
        let signer = StubSigner { key: [10u8; 32] };
        let (_, proof) = derive_identity(&signer, ADDR, &test_ctx()).unwrap();

        let json = serde_json::to_string(&proof).unwrap();
        let restored: IdentityProof = serde_json::from_str(&json).unwrap();
        assert_eq!(proof, restored);
    }
}
