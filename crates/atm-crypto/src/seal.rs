//! Authenticated sealing between the bank and an HSM.
//!
//! The wire-level HSM nonce is always 32 bytes, but ChaCha20-Poly1305 takes a
//! 12-byte nonce. Rather than truncate the HSM nonce directly — which would
//! throw away 20 bytes of entropy and let two different requests collide on
//! the same AEAD nonce if the HSM ever reused one — the AEAD nonce actually
//! fed to the cipher is `BLAKE3(ctx || hsm_nonce)[..12]`, where `ctx` is an
//! 8-byte tag identifying the operation (balance check vs. withdrawal). This
//! binds the ciphertext to both the HSM's nonce and the operation kind, so a
//! balance-check ciphertext can never be replayed as a withdrawal or vice
//! versa even if two operations are issued under the same HSM nonce.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use atm_core::{AtmError, Nonce32};

use crate::hash::blake3_hash_parts;

/// Operation context tags mixed into the derived AEAD nonce.
pub const CTX_BALANCE_CHECK: &[u8; 8] = b"bal-chk\0";
pub const CTX_WITHDRAWAL: &[u8; 8] = b"withdrw\0";

fn derive_aead_nonce(ctx: &[u8; 8], hsm_nonce: &Nonce32) -> [u8; 12] {
    let digest = blake3_hash_parts(&[&ctx[..], &hsm_nonce.as_bytes()[..]]);
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&digest[..12]);
    nonce
}

/// Seal `plaintext` under `key`, binding it to `ctx` and `hsm_nonce`.
pub fn secretbox_encrypt(
    key: &[u8; 32],
    ctx: &[u8; 8],
    hsm_nonce: &Nonce32,
    plaintext: &[u8],
) -> Result<Vec<u8>, AtmError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce_bytes = derive_aead_nonce(ctx, hsm_nonce);
    let nonce = Nonce::from_slice(&nonce_bytes);
    cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: ctx,
            },
        )
        .map_err(|e| AtmError::Seal(e.to_string()))
}

/// Open a ciphertext produced by [`secretbox_encrypt`] with the same
/// `key`, `ctx`, and `hsm_nonce`.
pub fn secretbox_decrypt(
    key: &[u8; 32],
    ctx: &[u8; 8],
    hsm_nonce: &Nonce32,
    ciphertext: &[u8],
) -> Result<Vec<u8>, AtmError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce_bytes = derive_aead_nonce(ctx, hsm_nonce);
    let nonce = Nonce::from_slice(&nonce_bytes);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: ctx,
            },
        )
        .map_err(|e| AtmError::Seal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = [3u8; 32];
        let nonce = Nonce32::from_slice(&[1u8; 32]).unwrap();
        let pt = b"balance:4200";
        let ct = secretbox_encrypt(&key, CTX_BALANCE_CHECK, &nonce, pt).unwrap();
        let opened = secretbox_decrypt(&key, CTX_BALANCE_CHECK, &nonce, &ct).unwrap();
        assert_eq!(opened, pt);
    }

    #[test]
    fn wrong_context_fails_to_open() {
        let key = [3u8; 32];
        let nonce = Nonce32::from_slice(&[1u8; 32]).unwrap();
        let ct = secretbox_encrypt(&key, CTX_BALANCE_CHECK, &nonce, b"payload").unwrap();
        assert!(secretbox_decrypt(&key, CTX_WITHDRAWAL, &nonce, &ct).is_err());
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let nonce = Nonce32::from_slice(&[1u8; 32]).unwrap();
        let ct = secretbox_encrypt(&[1u8; 32], CTX_WITHDRAWAL, &nonce, b"payload").unwrap();
        assert!(secretbox_decrypt(&[2u8; 32], CTX_WITHDRAWAL, &nonce, &ct).is_err());
    }

    #[test]
    fn different_nonces_produce_different_ciphertexts() {
        let key = [5u8; 32];
        let a = Nonce32::from_slice(&[1u8; 32]).unwrap();
        let b = Nonce32::from_slice(&[2u8; 32]).unwrap();
        let ct_a = secretbox_encrypt(&key, CTX_WITHDRAWAL, &a, b"payload").unwrap();
        let ct_b = secretbox_encrypt(&key, CTX_WITHDRAWAL, &b, b"payload").unwrap();
        assert_ne!(ct_a, ct_b);
    }
}
