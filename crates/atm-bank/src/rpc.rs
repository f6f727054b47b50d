//! Wires `BankVerifier` behind the `BankApi`/`AdminApi` JSON-RPC traits.
//! Binary protocol fields cross the wire as hex strings; see
//! `atm-rpc::bank_api` for why.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use atm_core::{AtmError, CardPublicKey, CardSignature, Nonce32};
use atm_rpc::{AdminApiServer, BankApiServer};

use crate::verifier::BankVerifier;

fn rpc_err(e: AtmError) -> ErrorObject<'static> {
    ErrorObject::owned(-32603, e.to_string(), None::<()>)
}

fn decode_hex(field: &'static str, s: &str) -> Result<Vec<u8>, ErrorObject<'static>> {
    hex::decode(s).map_err(|e| ErrorObject::owned(-32602, format!("invalid {field} hex: {e}"), None::<()>))
}

fn decode_nonce(field: &'static str, s: &str) -> Result<Nonce32, ErrorObject<'static>> {
    let bytes = decode_hex(field, s)?;
    Nonce32::from_slice(&bytes).map_err(rpc_err)
}

fn decode_sig(s: &str) -> Result<CardSignature, ErrorObject<'static>> {
    let bytes = decode_hex("sig", s)?;
    CardSignature::from_slice(&bytes).map_err(rpc_err)
}

fn decode_pk(s: &str) -> Result<CardPublicKey, ErrorObject<'static>> {
    let bytes = decode_hex("pk", s)?;
    CardPublicKey::from_slice(&bytes).map_err(rpc_err)
}

/// Shared RPC server state: a single `BankVerifier` behind both the
/// customer-facing `BankApi` and the admin `AdminApi`.
pub struct BankRpcServer {
    verifier: Arc<BankVerifier>,
}

impl BankRpcServer {
    pub fn new(verifier: Arc<BankVerifier>) -> Self {
        Self { verifier }
    }

    /// Start the customer-facing `BankApi` JSON-RPC server on `addr`.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);
        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;
        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "bank RPC server started");
        Ok(handle)
    }
}

/// The admin-facing server, served on a distinct port. Shares the
/// same `BankVerifier` (and hence the same DB mutex) as `BankRpcServer`.
pub struct AdminRpcServer {
    verifier: Arc<BankVerifier>,
}

impl AdminRpcServer {
    pub fn new(verifier: Arc<BankVerifier>) -> Self {
        Self { verifier }
    }

    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);
        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;
        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "admin RPC server started");
        Ok(handle)
    }
}

#[async_trait]
impl BankApiServer for BankRpcServer {
    async fn get_nonce(&self, card_id: String) -> RpcResult<String> {
        let nonce = self
            .verifier
            .get_nonce(&card_id)
            .map_err(rpc_err)?;
        Ok(hex::encode(nonce.as_bytes()))
    }

    async fn check_balance(
        &self,
        card_id: String,
        nonce: String,
        sig: String,
        hsm_id: String,
        hsm_nonce: String,
    ) -> RpcResult<String> {
        let nonce = decode_nonce("nonce", &nonce)?;
        let sig = decode_sig(&sig)?;
        let hsm_nonce = decode_nonce("hsm_nonce", &hsm_nonce)?;
        match self
            .verifier
            .check_balance(&card_id, &nonce, &sig, &hsm_id, &hsm_nonce)
        {
            Ok(ct) => Ok(hex::encode(ct)),
            Err(e) => {
                warn!(card_id = %card_id, error = %e, "check_balance refused");
                Ok(e.as_bank_reply())
            }
        }
    }

    async fn withdraw(
        &self,
        card_id: String,
        nonce: String,
        sig: String,
        hsm_id: String,
        hsm_nonce: String,
        amount: u32,
    ) -> RpcResult<String> {
        let nonce = decode_nonce("nonce", &nonce)?;
        let sig = decode_sig(&sig)?;
        let hsm_nonce = decode_nonce("hsm_nonce", &hsm_nonce)?;
        match self
            .verifier
            .withdraw(&card_id, &nonce, &sig, &hsm_id, &hsm_nonce, amount)
        {
            Ok(ct) => {
                info!(card_id = %card_id, amount, "withdrawal authorized");
                Ok(hex::encode(ct))
            }
            Err(e) => {
                warn!(card_id = %card_id, error = %e, "withdraw refused");
                Ok(e.as_bank_reply())
            }
        }
    }

    async fn change_pin(
        &self,
        card_id: String,
        nonce: String,
        sig: String,
        new_pk: String,
    ) -> RpcResult<String> {
        let nonce = decode_nonce("nonce", &nonce)?;
        let sig = decode_sig(&sig)?;
        let new_pk = decode_pk(&new_pk)?;
        match self.verifier.change_pin(&card_id, &nonce, &sig, &new_pk) {
            Ok(()) => {
                info!(card_id = %card_id, "pin changed");
                Ok("OKAY".to_string())
            }
            Err(e) => {
                warn!(card_id = %card_id, error = %e, "change_pin refused");
                Ok(e.as_bank_reply())
            }
        }
    }

    async fn set_first_pk(&self, card_id: String, pk: String) -> RpcResult<bool> {
        let pk = decode_pk(&pk)?;
        Ok(self.verifier.set_first_pk(&card_id, &pk).is_ok())
    }

    async fn set_initial_num_bills(&self, hsm_id: String, n: u32) -> RpcResult<bool> {
        Ok(self.verifier.set_initial_num_bills(&hsm_id, n).is_ok())
    }

    async fn set_hsm_key(&self, hsm_id: String, key: String) -> RpcResult<bool> {
        let bytes = decode_hex("hsm_key", &key)?;
        let Ok(key): Result<[u8; 32], _> = bytes.try_into() else {
            return Ok(false);
        };
        Ok(self.verifier.set_hsm_key(&hsm_id, key).is_ok())
    }
}

#[async_trait]
impl AdminApiServer for AdminRpcServer {
    async fn create_account(
        &self,
        card_id: String,
        account_name: String,
        balance: u64,
    ) -> RpcResult<bool> {
        Ok(self
            .verifier
            .create_account(&card_id, &account_name, balance)
            .is_ok())
    }

    async fn update_balance(&self, card_id: String, balance: u64) -> RpcResult<bool> {
        Ok(self.verifier.update_balance(&card_id, balance).is_ok())
    }

    async fn admin_check_balance(&self, card_id: String) -> RpcResult<Option<u64>> {
        self.verifier.admin_check_balance(&card_id).map_err(rpc_err)
    }

    async fn create_atm(&self, hsm_id: String) -> RpcResult<bool> {
        Ok(self.verifier.create_atm(&hsm_id).is_ok())
    }

    async fn ready_for_atm(&self, hsm_id: String) -> RpcResult<bool> {
        self.verifier.ready_for_atm(&hsm_id).map_err(rpc_err)
    }
}
