//! Card signing keys and detached signatures.
//!
//! A card's keypair is derived deterministically from its PIN: the PIN never
//! leaves the card, and the same PIN always yields the same public key, so
//! `request_new_public_key` can be implemented as "re-derive and
//! overwrite" rather than "generate and remember".

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

use atm_core::{AtmError, CardPublicKey, CardSignature, Nonce32};

use crate::hash::blake3_hash_parts;

/// Domain separation tag mixed into the PIN before hashing, so a card seed
/// can never collide with a BLAKE3 digest produced for an unrelated purpose.
const PIN_SEED_DOMAIN: &[u8] = b"atm-card-pin-seed-v1";

/// Derive the 32-byte Ed25519 seed for a card's PIN.
///
/// Deterministic and one-way: the PIN can be recovered only by brute force,
/// and two cards with the same PIN always get the same keypair.
fn derive_seed(pin: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(blake3_hash_parts(&[&PIN_SEED_DOMAIN[..], pin]))
}

/// A card's signing keypair, held only long enough to answer one challenge.
///
/// Unlike `atm-hsm`'s long-lived keys, `CardSigner` is reconstructed from the
/// PIN on every signing request, so nothing sensitive survives the call that
/// created it once the `Zeroizing` seed inside `SigningKey` is dropped.
pub struct CardSigner {
    signing_key: SigningKey,
}

impl CardSigner {
    /// Derive a signer from a raw PIN (already length-checked by the caller).
    pub fn from_pin(pin: &[u8]) -> Self {
        let seed = derive_seed(pin);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The public key a bank or HSM would record for this PIN.
    pub fn public_key(&self) -> CardPublicKey {
        CardPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a 32-byte HSM nonce, producing the detached signature the HSM
    /// forwards to the bank as part of a balance check or withdrawal.
    pub fn sign_nonce(&self, nonce: &Nonce32) -> CardSignature {
        let sig = self.signing_key.sign(nonce.as_bytes());
        CardSignature(sig.to_bytes())
    }
}

/// Verify that `sig` is a valid signature by `pk` over `nonce`.
///
/// Used by the bank to authenticate a withdrawal or balance check,
/// and by tests that want to check a card's signature without holding its PIN.
pub fn verify_nonce_signature(
    pk: &CardPublicKey,
    nonce: &Nonce32,
    sig: &CardSignature,
) -> Result<(), AtmError> {
    let verifying_key =
        VerifyingKey::from_bytes(pk.as_bytes()).map_err(|e| AtmError::Other(e.to_string()))?;
    let signature = ed25519_dalek::Signature::from_bytes(sig.as_bytes());
    verifying_key
        .verify(nonce.as_bytes(), &signature)
        .map_err(|_| AtmError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let signer = CardSigner::from_pin(b"12345678");
        let nonce = Nonce32::from_slice(&[9u8; 32]).unwrap();
        let sig = signer.sign_nonce(&nonce);
        assert!(verify_nonce_signature(&signer.public_key(), &nonce, &sig).is_ok());
    }

    #[test]
    fn tampered_nonce_fails_verification() {
        let signer = CardSigner::from_pin(b"12345678");
        let nonce = Nonce32::from_slice(&[9u8; 32]).unwrap();
        let sig = signer.sign_nonce(&nonce);
        let other = Nonce32::from_slice(&[8u8; 32]).unwrap();
        assert!(verify_nonce_signature(&signer.public_key(), &other, &sig).is_err());
    }

    #[test]
    fn same_pin_yields_same_public_key() {
        let a = CardSigner::from_pin(b"00000000");
        let b = CardSigner::from_pin(b"00000000");
        assert_eq!(a.public_key().as_bytes(), b.public_key().as_bytes());
    }

    #[test]
    fn different_pins_yield_different_keys() {
        let a = CardSigner::from_pin(b"00000000");
        let b = CardSigner::from_pin(b"00000001");
        assert_ne!(a.public_key().as_bytes(), b.public_key().as_bytes());
    }
}
