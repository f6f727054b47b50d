pub mod card_sig;
pub mod hash;
pub mod seal;

pub use card_sig::{verify_nonce_signature, CardSigner};
pub use hash::{blake3_hash, blake3_hash_parts};
pub use seal::{secretbox_decrypt, secretbox_encrypt, CTX_BALANCE_CHECK, CTX_WITHDRAWAL};
