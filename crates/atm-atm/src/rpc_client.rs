//! Thin wrappers over `jsonrpsee`'s HTTP client for the bank's RPC surface.
//!
//! `BankHandle` abstracts the subset of `BankApi` the orchestrator needs,
//! typed over the domain types in `atm-core` instead of hex strings — the
//! hex encoding is an artifact of the JSON wire and has no business leaking
//! into `AtmOrchestrator`. `BankRpcClient` is the real implementation;
//! tests substitute a scripted fake (see `orchestrator` tests).

use jsonrpsee::core::async_trait;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

use atm_core::{AtmError, CardId, CardPublicKey, CardSignature, HsmId, Nonce32};
use atm_rpc::{AdminApiClient, BankApiClient};

fn rpc_fail(e: impl std::fmt::Display) -> AtmError {
    AtmError::Other(e.to_string())
}

/// The bank operations `AtmOrchestrator` drives per customer round.
#[async_trait]
pub trait BankHandle: Send + Sync {
    async fn get_nonce(&self, card_id: &CardId) -> Result<Nonce32, AtmError>;

    async fn check_balance(
        &self,
        card_id: &CardId,
        nonce: &Nonce32,
        sig: &CardSignature,
        hsm_id: &HsmId,
        hsm_nonce: &Nonce32,
    ) -> Result<Vec<u8>, AtmError>;

    async fn withdraw(
        &self,
        card_id: &CardId,
        nonce: &Nonce32,
        sig: &CardSignature,
        hsm_id: &HsmId,
        hsm_nonce: &Nonce32,
        amount: u32,
    ) -> Result<Vec<u8>, AtmError>;

    async fn change_pin(
        &self,
        card_id: &CardId,
        nonce: &Nonce32,
        sig: &CardSignature,
        new_pk: &CardPublicKey,
    ) -> Result<(), AtmError>;
}

/// A live `BankHandle`/provisioning client over `jsonrpsee`'s HTTP client.
pub struct BankRpcClient {
    bank: HttpClient,
    admin: HttpClient,
}

impl BankRpcClient {
    /// `bank_url` serves `BankApi` (customer port); `admin_url` serves
    /// `AdminApi` on its own distinct port.
    pub fn new(bank_url: &str, admin_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            bank: HttpClientBuilder::default().build(bank_url)?,
            admin: HttpClientBuilder::default().build(admin_url)?,
        })
    }

    /// Write-once: record `pk` for `card_id` iff it has none yet. Exposed
    /// for the provisioning CLI, not part of `BankHandle`.
    pub async fn set_first_pk(&self, card_id: &str, pk: &CardPublicKey) -> Result<bool, AtmError> {
        self.bank
            .set_first_pk(card_id.to_string(), hex::encode(pk.as_bytes()))
            .await
            .map_err(rpc_fail)
    }

    /// Write-once: record an ATM's initial bill stock iff unset.
    pub async fn set_initial_num_bills(&self, hsm_id: &str, n: u32) -> Result<bool, AtmError> {
        self.bank
            .set_initial_num_bills(hsm_id.to_string(), n)
            .await
            .map_err(rpc_fail)
    }

    /// Write-once: record the symmetric key the bank shares with `hsm_id`,
    /// carried in the same `hsm_blob` the device provisioning step consumes.
    pub async fn set_hsm_key(&self, hsm_id: &str, key: &[u8; 32]) -> Result<bool, AtmError> {
        self.bank
            .set_hsm_key(hsm_id.to_string(), hex::encode(key))
            .await
            .map_err(rpc_fail)
    }

    /// Admin surface: open a blank account.
    pub async fn create_account(
        &self,
        card_id: &str,
        account_name: &str,
        balance: u64,
    ) -> Result<bool, AtmError> {
        self.admin
            .create_account(card_id.to_string(), account_name.to_string(), balance)
            .await
            .map_err(rpc_fail)
    }

    /// Admin surface: register a blank ATM row.
    pub async fn create_atm(&self, hsm_id: &str) -> Result<bool, AtmError> {
        self.admin.create_atm(hsm_id.to_string()).await.map_err(rpc_fail)
    }
}

#[async_trait]
impl BankHandle for BankRpcClient {
    async fn get_nonce(&self, card_id: &CardId) -> Result<Nonce32, AtmError> {
        let hex_nonce = self
            .bank
            .get_nonce(card_id.as_str().to_string())
            .await
            .map_err(rpc_fail)?;
        let bytes = hex::decode(hex_nonce).map_err(rpc_fail)?;
        Nonce32::from_slice(&bytes)
    }

    async fn check_balance(
        &self,
        card_id: &CardId,
        nonce: &Nonce32,
        sig: &CardSignature,
        hsm_id: &HsmId,
        hsm_nonce: &Nonce32,
    ) -> Result<Vec<u8>, AtmError> {
        let reply = self
            .bank
            .check_balance(
                card_id.as_str().to_string(),
                hex::encode(nonce.as_bytes()),
                hex::encode(sig.as_bytes()),
                hsm_id.as_str().to_string(),
                hex::encode(hsm_nonce.as_bytes()),
            )
            .await
            .map_err(rpc_fail)?;
        bank_reply_to_ciphertext(reply)
    }

    async fn withdraw(
        &self,
        card_id: &CardId,
        nonce: &Nonce32,
        sig: &CardSignature,
        hsm_id: &HsmId,
        hsm_nonce: &Nonce32,
        amount: u32,
    ) -> Result<Vec<u8>, AtmError> {
        let reply = self
            .bank
            .withdraw(
                card_id.as_str().to_string(),
                hex::encode(nonce.as_bytes()),
                hex::encode(sig.as_bytes()),
                hsm_id.as_str().to_string(),
                hex::encode(hsm_nonce.as_bytes()),
                amount,
            )
            .await
            .map_err(rpc_fail)?;
        bank_reply_to_ciphertext(reply)
    }

    async fn change_pin(
        &self,
        card_id: &CardId,
        nonce: &Nonce32,
        sig: &CardSignature,
        new_pk: &CardPublicKey,
    ) -> Result<(), AtmError> {
        let reply = self
            .bank
            .change_pin(
                card_id.as_str().to_string(),
                hex::encode(nonce.as_bytes()),
                hex::encode(sig.as_bytes()),
                hex::encode(new_pk.as_bytes()),
            )
            .await
            .map_err(rpc_fail)?;
        if reply == "OKAY" {
            Ok(())
        } else {
            Err(AtmError::Other(reply))
        }
    }
}

/// A bank reply is either a hex ciphertext or a string beginning with
/// `"ERROR"`; this is the one place that distinction is parsed.
fn bank_reply_to_ciphertext(reply: String) -> Result<Vec<u8>, AtmError> {
    if reply.starts_with("ERROR") {
        return Err(AtmError::Other(reply));
    }
    hex::decode(reply).map_err(rpc_fail)
}
