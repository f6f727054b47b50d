//! `CardProxy`: the card-side operations of the serial protocol.
//!
//! Every operation but `provision` begins with a `Normal`-mode sync round;
//! `provision` begins with a `Provision`-mode round instead, since it is
//! only valid on a card that has not yet been initialized.

use std::sync::Arc;

use atm_core::constants::{CARD_PK_LEN, CARD_SIG_LEN, NONCE_LEN, PIN_LEN, UUID_STR_LEN};
use atm_core::{opcodes, AtmError, CardId, CardPublicKey, CardSignature, Nonce32};
use atm_device::{DeviceLink, SyncMode};

/// A CARD-role `DeviceLink`, wrapped with the card's four protocol operations.
pub struct CardProxy {
    link: Arc<DeviceLink>,
}

impl CardProxy {
    pub fn new(link: Arc<DeviceLink>) -> Self {
        Self { link }
    }

    /// Read the card's identifier (`get_card_id`).
    pub fn get_card_id(&self) -> Result<CardId, AtmError> {
        self.link.sync(SyncMode::Normal)?;
        let reply = self
            .link
            .request_reply(&[opcodes::REQUEST_NAME], 1 + UUID_STR_LEN)?;
        let (tag, body) = split_tag(&reply)?;
        if tag != opcodes::RETURN_NAME {
            return Err(AtmError::CardRefused);
        }
        let id_str = std::str::from_utf8(body).map_err(|_| AtmError::CardRefused)?;
        CardId::new(id_str)
    }

    /// Ask the card to sign `nonce` under the key derived from `pin`
    /// (`sign_nonce`). The card verifies the PIN internally; a mismatch comes
    /// back as a non-matching reply tag, surfaced here as `CardRefused`.
    pub fn sign_nonce(&self, nonce: &Nonce32, pin: &[u8; PIN_LEN]) -> Result<CardSignature, AtmError> {
        self.link.sync(SyncMode::Normal)?;
        let mut request = Vec::with_capacity(1 + NONCE_LEN + PIN_LEN);
        request.push(opcodes::REQUEST_CARD_SIGNATURE);
        request.extend_from_slice(nonce.as_bytes());
        request.extend_from_slice(pin);
        let reply = self.link.request_reply(&request, 1 + CARD_SIG_LEN)?;
        let (tag, body) = split_tag(&reply)?;
        if tag != opcodes::RETURN_CARD_SIGNATURE {
            return Err(AtmError::CardRefused);
        }
        CardSignature::from_slice(body)
    }

    /// Derive the public key corresponding to `pin`
    /// (`request_new_public_key`), without changing which key the card
    /// reports as current — that happens only once the bank accepts the new
    /// key via `change_pin`.
    pub fn request_new_public_key(&self, pin: &[u8; PIN_LEN]) -> Result<CardPublicKey, AtmError> {
        self.link.sync(SyncMode::Normal)?;
        let mut request = Vec::with_capacity(1 + PIN_LEN);
        request.push(opcodes::REQUEST_NEW_PK);
        request.extend_from_slice(pin);
        let reply = self.link.request_reply(&request, 1 + CARD_PK_LEN)?;
        let (tag, body) = split_tag(&reply)?;
        if tag != opcodes::RETURN_NEW_PK {
            return Err(AtmError::CardRefused);
        }
        CardPublicKey::from_slice(body)
    }

    /// Provision a blank card with its first keying material and identity
    /// (`provision`). Write-once: calling this on an already
    /// provisioned card fails `sync` with `AlreadyProvisioned`.
    pub fn provision(
        &self,
        r: &[u8; 32],
        rand_key: &[u8; 32],
        card_id: &str,
    ) -> Result<(), AtmError> {
        if card_id.len() != UUID_STR_LEN {
            return Err(AtmError::InvalidIdLength {
                expected: UUID_STR_LEN,
                got: card_id.len(),
            });
        }
        self.link.sync(SyncMode::Provision)?;
        let mut request = Vec::with_capacity(1 + 32 + 32 + UUID_STR_LEN);
        request.push(opcodes::REQUEST_PROVISION);
        request.extend_from_slice(r);
        request.extend_from_slice(rand_key);
        request.extend_from_slice(card_id.as_bytes());
        let reply = self.link.request_reply(&request, 1)?;
        match reply[0] {
            opcodes::ACCEPTED => Ok(()),
            opcodes::REJECTED => Err(AtmError::CardRefused),
            other => Err(AtmError::UnexpectedTag(other)),
        }
    }
}

fn split_tag(reply: &[u8]) -> Result<(u8, &[u8]), AtmError> {
    reply
        .split_first()
        .map(|(tag, body)| (*tag, body))
        .ok_or(AtmError::DeviceRemoved)
}
