use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

/// The bank's administrator-facing surface, served on a distinct port.
/// A complete deployment needs it to open accounts and ATMs in the first
/// place, so it is carried here as the ambient management surface around
/// the protocol core.
#[rpc(server, client, namespace = "admin")]
pub trait AdminApi {
    /// Register a new card with an initial balance and no public key yet.
    #[method(name = "createAccount")]
    async fn create_account(
        &self,
        card_id: String,
        account_name: String,
        balance: u64,
    ) -> RpcResult<bool>;

    /// Overwrite a card's balance directly (administrative correction, not
    /// a withdrawal).
    #[method(name = "updateBalance")]
    async fn update_balance(&self, card_id: String, balance: u64) -> RpcResult<bool>;

    /// Read a card's balance without the nonce/signature dance.
    #[method(name = "adminCheckBalance")]
    async fn admin_check_balance(&self, card_id: String) -> RpcResult<Option<u64>>;

    /// Register a new ATM/HSM row with no key or bill stock yet.
    #[method(name = "createAtm")]
    async fn create_atm(&self, hsm_id: String) -> RpcResult<bool>;

    /// True once an ATM has a shared key and an initial bill count on file.
    #[method(name = "readyForAtm")]
    async fn ready_for_atm(&self, hsm_id: String) -> RpcResult<bool>;
}
