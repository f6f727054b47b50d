//! Persistent record shapes for the `cards` and `atms` trees.

use serde::{Deserialize, Serialize};

use atm_core::constants::{CARD_PK_LEN, NONCE_LEN};
use atm_core::Timestamp;

/// One provisioned card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRecord {
    pub card_id: String,
    pub account_name: String,
    pub balance: u64,
    /// Absent until the card's first provisioning round returns a key.
    pub pk: Option<[u8; CARD_PK_LEN]>,
    /// The live challenge most recently issued to this card, if any.
    pub nonce_state: Option<NonceState>,
}

impl CardRecord {
    pub fn new(card_id: String, account_name: String, balance: u64) -> Self {
        Self {
            card_id,
            account_name,
            balance,
            pk: None,
            nonce_state: None,
        }
    }
}

/// The `nonce`/`timestamp`/`used` triple, bundled so a card always
/// has either zero or one live-or-spent challenge on record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NonceState {
    pub nonce: [u8; NONCE_LEN],
    pub issued_at: Timestamp,
    pub used: bool,
}

impl NonceState {
    /// True iff this state could still be redeemed right now.
    pub fn is_live(&self, now: Timestamp, validity_secs: i64) -> bool {
        !self.used && now - self.issued_at <= validity_secs
    }
}

/// One provisioned ATM (identified by its HSM's UUID).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtmRecord {
    pub hsm_id: String,
    /// Absent until provisioning sets the shared symmetric key.
    pub hsm_key: Option<[u8; 32]>,
    /// Absent until provisioning sets the initial bill stock.
    pub num_bills: Option<u32>,
}

impl AtmRecord {
    pub fn new(hsm_id: String) -> Self {
        Self {
            hsm_id,
            hsm_key: None,
            num_bills: None,
        }
    }
}
