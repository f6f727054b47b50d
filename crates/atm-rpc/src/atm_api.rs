use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

/// The ATM node's own RPC surface: the customer operations driven by
/// `AtmOrchestrator`, plus the provisioning entry points.
///
/// All methods collapse any failure to `Ok(false)`/`Ok(None)` rather than a
/// JSON-RPC error — a teller UI or CLI never needs to distinguish "wrong
/// PIN" from "card removed" from "bank unreachable" at this layer.
#[rpc(server, client, namespace = "atm")]
pub trait AtmApi {
    /// Return the inserted card's balance, authenticating with `pin`.
    #[method(name = "checkBalance")]
    async fn check_balance(&self, pin: String) -> RpcResult<Option<u64>>;

    /// Dispense `amount` bills from the inserted card's balance.
    #[method(name = "withdraw")]
    async fn withdraw(&self, pin: String, amount: u32) -> RpcResult<Option<Vec<String>>>;

    /// Replace the inserted card's PIN.
    #[method(name = "changePin")]
    async fn change_pin(&self, old_pin: String, new_pin: String) -> RpcResult<bool>;

    /// Provision a blank card: `card_blob` is `hex(r[32] ‖ rand_key[32] ‖
    /// card_id[36])`, exactly 100 bytes once decoded.
    #[method(name = "provisionCard")]
    async fn provision_card(&self, card_blob: String, pin: String) -> RpcResult<bool>;

    /// Provision a blank HSM: `hsm_blob` is `hex(hsm_key[32] ‖ rand_key[32]
    /// ‖ hsm_id[36])`, exactly 100 bytes once decoded. `bills` is the
    /// initial stock, each a hex-encoded 16-byte bill string.
    #[method(name = "provisionAtm")]
    async fn provision_atm(&self, hsm_blob: String, bills: Vec<String>) -> RpcResult<bool>;
}
