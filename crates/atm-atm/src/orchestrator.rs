//! `AtmOrchestrator`: drives the three customer-operation sequences.
//!
//! Stateless: every public method starts from nothing and ends with either a
//! success value or `None`/`false`. No partial side effect is user-visible
//! because all durable mutation happens in `BankVerifier`, gated on nonce
//! consumption — the orchestrator itself holds no state between calls.

use std::sync::Arc;

use atm_card::CardProxy;
use atm_core::constants::PIN_LEN;
use atm_core::{AtmError, Bill};
use atm_hsm::HsmProxy;

use crate::rpc_client::BankHandle;

/// Stateless driver over one CARD link, one HSM link, and a bank RPC handle.
pub struct AtmOrchestrator<B: BankHandle> {
    card: Arc<CardProxy>,
    hsm: Arc<HsmProxy>,
    bank: Arc<B>,
}

impl<B: BankHandle> AtmOrchestrator<B> {
    pub fn new(card: Arc<CardProxy>, hsm: Arc<HsmProxy>, bank: Arc<B>) -> Self {
        Self { card, hsm, bank }
    }

    /// `check_balance(pin)`. Requires both CARD and HSM inserted.
    pub async fn check_balance(&self, pin: &[u8; PIN_LEN]) -> Option<u32> {
        self.check_balance_inner(pin).await.ok()
    }

    async fn check_balance_inner(&self, pin: &[u8; PIN_LEN]) -> Result<u32, AtmError> {
        let card_id = self.card.get_card_id()?;
        let hsm_id = self.hsm.get_uuid()?;
        let hsm_nonce = self.hsm.get_nonce()?;
        let nonce = self.bank.get_nonce(&card_id).await?;
        let sig = self.card.sign_nonce(&nonce, pin)?;
        let ct = self
            .bank
            .check_balance(&card_id, &nonce, &sig, &hsm_id, &hsm_nonce)
            .await?;
        self.hsm.handle_balance_check(&ct)
    }

    /// `withdraw(pin, amount)`. Requires both CARD and HSM inserted.
    pub async fn withdraw(&self, pin: &[u8; PIN_LEN], amount: u32) -> Option<Vec<Bill>> {
        self.withdraw_inner(pin, amount).await.ok()
    }

    async fn withdraw_inner(&self, pin: &[u8; PIN_LEN], amount: u32) -> Result<Vec<Bill>, AtmError> {
        let card_id = self.card.get_card_id()?;
        let hsm_id = self.hsm.get_uuid()?;
        let hsm_nonce = self.hsm.get_nonce()?;
        let nonce = self.bank.get_nonce(&card_id).await?;
        let sig = self.card.sign_nonce(&nonce, pin)?;
        let ct = self
            .bank
            .withdraw(&card_id, &nonce, &sig, &hsm_id, &hsm_nonce, amount)
            .await?;
        self.hsm.handle_withdrawal(&ct)
    }

    /// `change_pin(old_pin, new_pin)`. CARD-only; no HSM participation.
    pub async fn change_pin(&self, old_pin: &[u8; PIN_LEN], new_pin: &[u8; PIN_LEN]) -> bool {
        self.change_pin_inner(old_pin, new_pin).await.is_ok()
    }

    async fn change_pin_inner(
        &self,
        old_pin: &[u8; PIN_LEN],
        new_pin: &[u8; PIN_LEN],
    ) -> Result<(), AtmError> {
        let card_id = self.card.get_card_id()?;
        let nonce = self.bank.get_nonce(&card_id).await?;
        let new_pk = self.card.request_new_public_key(new_pin)?;
        let sig = self.card.sign_nonce(&nonce, old_pin)?;
        self.bank.change_pin(&card_id, &nonce, &sig, &new_pk).await
    }
}
