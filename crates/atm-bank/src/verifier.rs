//! `BankVerifier`: the bank's request-handling core.
//!
//! Every public method here holds `guard` for its entire read-modify-write
//! span, so two concurrent requests against the same card can never
//! interleave their validation and their commit — the mutex is the Rust
//! equivalent of the source's "lock_db" decorator.

use std::sync::Mutex;

use rand::{thread_rng, Rng};

use atm_core::constants::{NONCE_LEN, NONCE_VALIDITY_SECS};
use atm_core::{AtmError, CardPublicKey, CardSignature, Nonce32};
use atm_crypto::{secretbox_encrypt, verify_nonce_signature, CTX_BALANCE_CHECK, CTX_WITHDRAWAL};

use crate::db::StateDb;
use crate::model::{AtmRecord, CardRecord, NonceState};

pub struct BankVerifier {
    db: StateDb,
    guard: Mutex<()>,
}

impl BankVerifier {
    pub fn new(db: StateDb) -> Self {
        Self {
            db,
            guard: Mutex::new(()),
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Issue a fresh nonce for a card, refusing if a live one already exists.
    pub fn get_nonce(&self, card_id: &str) -> Result<Nonce32, AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let mut card = self
            .db
            .get_card(card_id)?
            .ok_or_else(|| AtmError::UnknownCard(card_id.to_string()))?;

        let now = Self::now();
        if let Some(ns) = card.nonce_state {
            if ns.is_live(now, NONCE_VALIDITY_SECS) {
                return Err(AtmError::NonceStillLive);
            }
        }

        let mut nonce = [0u8; NONCE_LEN];
        thread_rng().fill(&mut nonce);
        card.nonce_state = Some(NonceState {
            nonce,
            issued_at: now,
            used: false,
        });
        self.db.put_card(&card)?;
        Ok(Nonce32(nonce))
    }

    /// Consume a nonce, verify the card's signature, and seal the balance for the HSM.
    pub fn check_balance(
        &self,
        card_id: &str,
        nonce: &Nonce32,
        sig: &CardSignature,
        hsm_id: &str,
        hsm_nonce: &Nonce32,
    ) -> Result<Vec<u8>, AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let now = Self::now();

        let mut card = self
            .db
            .get_card(card_id)?
            .ok_or_else(|| AtmError::UnknownCard(card_id.to_string()))?;
        let atm = self
            .db
            .get_atm(hsm_id)?
            .ok_or_else(|| AtmError::UnknownHsm(hsm_id.to_string()))?;

        require_live_nonce(&card, nonce, now)?;
        let pk = card.pk.ok_or(AtmError::InvalidSignature)?;
        verify_nonce_signature(&CardPublicKey(pk), nonce, sig)?;

        card.nonce_state.as_mut().expect("checked by require_live_nonce").used = true;
        self.db.put_card(&card)?;

        let hsm_key = atm
            .hsm_key
            .ok_or_else(|| AtmError::UnknownHsm(hsm_id.to_string()))?;
        let balance = u32::try_from(card.balance)
            .map_err(|_| AtmError::Other("balance exceeds wire width".to_string()))?;
        secretbox_encrypt(&hsm_key, CTX_BALANCE_CHECK, hsm_nonce, &balance.to_be_bytes())
    }

    /// As `check_balance`, but also debits the card and the ATM's bill stock.
    pub fn withdraw(
        &self,
        card_id: &str,
        nonce: &Nonce32,
        sig: &CardSignature,
        hsm_id: &str,
        hsm_nonce: &Nonce32,
        amount: u32,
    ) -> Result<Vec<u8>, AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let now = Self::now();

        let mut card = self
            .db
            .get_card(card_id)?
            .ok_or_else(|| AtmError::UnknownCard(card_id.to_string()))?;
        let mut atm = self
            .db
            .get_atm(hsm_id)?
            .ok_or_else(|| AtmError::UnknownHsm(hsm_id.to_string()))?;

        require_live_nonce(&card, nonce, now)?;
        let pk = card.pk.ok_or(AtmError::InvalidSignature)?;
        verify_nonce_signature(&CardPublicKey(pk), nonce, sig)?;

        let amount_u64 = amount as u64;
        if amount_u64 > card.balance {
            return Err(AtmError::InsufficientBalance {
                have: card.balance,
                need: amount_u64,
            });
        }
        let have_bills = atm.num_bills.unwrap_or(0);
        if amount > have_bills {
            return Err(AtmError::InsufficientBills {
                have: have_bills,
                need: amount,
            });
        }

        card.nonce_state.as_mut().expect("checked by require_live_nonce").used = true;
        card.balance -= amount_u64;
        atm.num_bills = Some(have_bills - amount);

        let hsm_key = atm
            .hsm_key
            .ok_or_else(|| AtmError::UnknownHsm(hsm_id.to_string()))?;
        let ciphertext =
            secretbox_encrypt(&hsm_key, CTX_WITHDRAWAL, hsm_nonce, &amount.to_be_bytes())?;

        // Commit only after the ciphertext is produced, so a crypto failure
        // never leaves a decremented balance behind.
        self.db.put_card(&card)?;
        self.db.put_atm(&atm)?;
        Ok(ciphertext)
    }

    /// As `check_balance`, but replaces the card's public key on success.
    pub fn change_pin(
        &self,
        card_id: &str,
        nonce: &Nonce32,
        sig: &CardSignature,
        new_pk: &CardPublicKey,
    ) -> Result<(), AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let now = Self::now();

        let mut card = self
            .db
            .get_card(card_id)?
            .ok_or_else(|| AtmError::UnknownCard(card_id.to_string()))?;

        require_live_nonce(&card, nonce, now)?;
        let pk = card.pk.ok_or(AtmError::InvalidSignature)?;
        verify_nonce_signature(&CardPublicKey(pk), nonce, sig)?;

        card.nonce_state.as_mut().expect("checked by require_live_nonce").used = true;
        card.pk = Some(*new_pk.as_bytes());
        self.db.put_card(&card)
    }

    /// Write-once: record the card's first public key.
    pub fn set_first_pk(&self, card_id: &str, pk: &CardPublicKey) -> Result<(), AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let mut card = self
            .db
            .get_card(card_id)?
            .ok_or_else(|| AtmError::UnknownCard(card_id.to_string()))?;
        if card.pk.is_some() {
            return Err(AtmError::PublicKeyAlreadySet);
        }
        card.pk = Some(*pk.as_bytes());
        self.db.put_card(&card)
    }

    /// Write-once: record the symmetric key the bank shares with `hsm_id`.
    /// Required by the balance/withdrawal handlers, which read this key to
    /// seal a ciphertext; the same `hsm_blob` carries this key to the device
    /// in the same provisioning step — grounded in the original admin
    /// backend's `create_atm`, which generates and stores the HSM key at the
    /// same moment it mints the HSM's identity.
    pub fn set_hsm_key(&self, hsm_id: &str, key: [u8; 32]) -> Result<(), AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let mut atm = self
            .db
            .get_atm(hsm_id)?
            .ok_or_else(|| AtmError::UnknownHsm(hsm_id.to_string()))?;
        if atm.hsm_key.is_some() {
            return Err(AtmError::HsmKeyAlreadySet);
        }
        atm.hsm_key = Some(key);
        self.db.put_atm(&atm)
    }

    /// Write-once: record the ATM's initial bill stock.
    pub fn set_initial_num_bills(&self, hsm_id: &str, n: u32) -> Result<(), AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let mut atm = self
            .db
            .get_atm(hsm_id)?
            .ok_or_else(|| AtmError::UnknownHsm(hsm_id.to_string()))?;
        if atm.num_bills.is_some() {
            return Err(AtmError::NumBillsAlreadySet);
        }
        atm.num_bills = Some(n);
        self.db.put_atm(&atm)
    }

    // ── Admin surface (ambient management, not core) ──────────────────────

    pub fn create_account(
        &self,
        card_id: &str,
        account_name: &str,
        balance: u64,
    ) -> Result<(), AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        if self.db.card_exists(card_id) {
            return Err(AtmError::Other(format!("card {card_id} already exists")));
        }
        self.db
            .put_card(&CardRecord::new(card_id.to_string(), account_name.to_string(), balance))
    }

    pub fn update_balance(&self, card_id: &str, balance: u64) -> Result<(), AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let mut card = self
            .db
            .get_card(card_id)?
            .ok_or_else(|| AtmError::UnknownCard(card_id.to_string()))?;
        card.balance = balance;
        self.db.put_card(&card)
    }

    pub fn admin_check_balance(&self, card_id: &str) -> Result<Option<u64>, AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        Ok(self.db.get_card(card_id)?.map(|c| c.balance))
    }

    pub fn create_atm(&self, hsm_id: &str) -> Result<(), AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        if self.db.atm_exists(hsm_id) {
            return Err(AtmError::Other(format!("atm {hsm_id} already exists")));
        }
        self.db.put_atm(&AtmRecord::new(hsm_id.to_string()))
    }

    pub fn ready_for_atm(&self, hsm_id: &str) -> Result<bool, AtmError> {
        let _lock = self.guard.lock().expect("bank db mutex poisoned");
        let atm = self
            .db
            .get_atm(hsm_id)?
            .ok_or_else(|| AtmError::UnknownHsm(hsm_id.to_string()))?;
        Ok(atm.hsm_key.is_some() && atm.num_bills.is_some())
    }
}

fn require_live_nonce(card: &CardRecord, nonce: &Nonce32, now: i64) -> Result<(), AtmError> {
    let ns = card.nonce_state.ok_or(AtmError::NoLiveNonce)?;
    if ns.nonce != *nonce.as_bytes() {
        return Err(AtmError::NonceMismatch);
    }
    if ns.used {
        return Err(AtmError::NonceAlreadyUsed);
    }
    if now - ns.issued_at > NONCE_VALIDITY_SECS {
        return Err(AtmError::NonceExpired);
    }
    Ok(())
}
