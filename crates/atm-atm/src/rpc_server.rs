//! Wires `AtmOrchestrator` and the provisioning entry points behind `AtmApi`.
//! Every method collapses failure to `Ok(false)`/`Ok(None)` rather than a
//! JSON-RPC error, so callers never need to distinguish "wrong PIN" from
//! "card removed" from "bank unreachable" at this layer.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use atm_card::CardProxy;
use atm_core::constants::{BILL_LEN, PIN_LEN, UUID_STR_LEN};
use atm_core::Bill;
use atm_hsm::HsmProxy;
use atm_rpc::AtmApiServer;

use crate::orchestrator::AtmOrchestrator;
use crate::rpc_client::BankRpcClient;

const CARD_BLOB_LEN: usize = 32 + 32 + UUID_STR_LEN;
const HSM_BLOB_LEN: usize = 32 + 32 + UUID_STR_LEN;

fn pin_from_string(pin: &str) -> Option<[u8; PIN_LEN]> {
    let bytes = pin.as_bytes();
    if bytes.len() != PIN_LEN {
        return None;
    }
    let mut arr = [0u8; PIN_LEN];
    arr.copy_from_slice(bytes);
    Some(arr)
}

pub struct AtmRpcServer {
    orchestrator: AtmOrchestrator<BankRpcClient>,
    card: Arc<CardProxy>,
    hsm: Arc<HsmProxy>,
    bank: Arc<BankRpcClient>,
}

impl AtmRpcServer {
    pub fn new(card: Arc<CardProxy>, hsm: Arc<HsmProxy>, bank: Arc<BankRpcClient>) -> Self {
        let orchestrator = AtmOrchestrator::new(Arc::clone(&card), Arc::clone(&hsm), Arc::clone(&bank));
        Self {
            orchestrator,
            card,
            hsm,
            bank,
        }
    }

    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);
        let middleware = tower::ServiceBuilder::new().layer(cors);

        let server = Server::builder()
            .set_http_middleware(middleware)
            .build(addr)
            .await?;
        let handle = server.start(self.into_rpc());
        Ok(handle)
    }
}

#[async_trait]
impl AtmApiServer for AtmRpcServer {
    async fn check_balance(&self, pin: String) -> RpcResult<Option<u64>> {
        let Some(pin) = pin_from_string(&pin) else {
            return Ok(None);
        };
        Ok(self.orchestrator.check_balance(&pin).await.map(u64::from))
    }

    async fn withdraw(&self, pin: String, amount: u32) -> RpcResult<Option<Vec<String>>> {
        let Some(pin) = pin_from_string(&pin) else {
            return Ok(None);
        };
        let bills = self.orchestrator.withdraw(&pin, amount).await;
        Ok(bills.map(|bs| bs.iter().map(|b| hex::encode(b.as_bytes())).collect()))
    }

    async fn change_pin(&self, old_pin: String, new_pin: String) -> RpcResult<bool> {
        let (Some(old_pin), Some(new_pin)) = (pin_from_string(&old_pin), pin_from_string(&new_pin))
        else {
            return Ok(false);
        };
        Ok(self.orchestrator.change_pin(&old_pin, &new_pin).await)
    }

    async fn provision_card(&self, card_blob: String, pin: String) -> RpcResult<bool> {
        Ok(self.provision_card_inner(&card_blob, &pin).await)
    }

    async fn provision_atm(&self, hsm_blob: String, bills: Vec<String>) -> RpcResult<bool> {
        Ok(self.provision_atm_inner(&hsm_blob, &bills).await)
    }
}

impl AtmRpcServer {
    async fn provision_card_inner(&self, card_blob: &str, pin: &str) -> bool {
        let Ok(blob) = hex::decode(card_blob) else {
            return false;
        };
        if blob.len() != CARD_BLOB_LEN {
            warn!(got = blob.len(), expected = CARD_BLOB_LEN, "card provisioning blob has the wrong length");
            return false;
        }
        let Some(pin) = pin_from_string(pin) else {
            return false;
        };

        let mut r = [0u8; 32];
        r.copy_from_slice(&blob[0..32]);
        let mut rand_key = [0u8; 32];
        rand_key.copy_from_slice(&blob[32..64]);
        let Ok(card_id) = std::str::from_utf8(&blob[64..CARD_BLOB_LEN]) else {
            return false;
        };

        if self.card.provision(&r, &rand_key, card_id).is_err() {
            return false;
        }

        let Ok(pk) = self.card.request_new_public_key(&pin) else {
            return false;
        };
        match self.bank.set_first_pk(card_id, &pk).await {
            Ok(true) => {
                info!(card_id, "card provisioned");
                true
            }
            _ => false,
        }
    }

    async fn provision_atm_inner(&self, hsm_blob: &str, bills: &[String]) -> bool {
        let Ok(blob) = hex::decode(hsm_blob) else {
            return false;
        };
        if blob.len() != HSM_BLOB_LEN {
            warn!(got = blob.len(), expected = HSM_BLOB_LEN, "ATM provisioning blob has the wrong length");
            return false;
        }

        let mut hsm_key = [0u8; 32];
        hsm_key.copy_from_slice(&blob[0..32]);
        let mut rand_key = [0u8; 32];
        rand_key.copy_from_slice(&blob[32..64]);
        let Ok(hsm_id) = std::str::from_utf8(&blob[64..HSM_BLOB_LEN]) else {
            return false;
        };

        let mut decoded_bills = Vec::with_capacity(bills.len());
        for b in bills {
            let Ok(raw) = hex::decode(b) else {
                return false;
            };
            if raw.len() != BILL_LEN {
                return false;
            }
            match Bill::from_slice(&raw) {
                Ok(bill) => decoded_bills.push(bill),
                Err(_) => return false,
            }
        }

        if self
            .hsm
            .provision(&hsm_key, &rand_key, hsm_id, &decoded_bills)
            .is_err()
        {
            return false;
        }

        if !matches!(self.bank.set_hsm_key(hsm_id, &hsm_key).await, Ok(true)) {
            return false;
        }

        match self
            .bank
            .set_initial_num_bills(hsm_id, decoded_bills.len() as u32)
            .await
        {
            Ok(true) => {
                info!(hsm_id, bills = decoded_bills.len(), "ATM provisioned");
                true
            }
            _ => false,
        }
    }
}
