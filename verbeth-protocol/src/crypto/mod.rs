pub mod constant_time;
pub mod encryption;
pub mod hashing;
pub mod kdf;
pub mod key_exchange;
pub mod pqc;
pub mod signing;

pub use constant_time::{eq_32, eq_64, eq_slices};
pub use encryption::{decrypt_with_aad, encrypt_with_aad, open, seal};
pub use hashing::{keccak256, keccak256_concat, recipient_hash};
pub use kdf::{
    chain_step, hybrid_initial_secret, hybrid_tag, message_nonce, ratchet_step, root_init,
};
pub use key_exchange::{derive_public_key, derive_shared_secret, generate_keypair};
pub use pqc::{
    decapsulate, encapsulate, KemKeyPair, MLKEM768_CT_BYTES, MLKEM768_DK_BYTES, MLKEM768_EK_BYTES,
};
pub use signing::{keypair_from_seed, sign_data, verify_signature};
