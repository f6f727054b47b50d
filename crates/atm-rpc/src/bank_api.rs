use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

/// The bank's customer-facing RPC surface.
///
/// Binary fields (nonces, signatures, keys) cross the wire as hex strings.
/// Business-logic failures are NOT jsonrpsee errors: `check_balance`,
/// `withdraw`, and `change_pin` return a plain string that begins with
/// `"ERROR"` on failure — only malformed requests (bad hex, unknown
/// method) produce a JSON-RPC-level error.
#[rpc(server, client, namespace = "bank")]
pub trait BankApi {
    /// Issue a fresh nonce for `card_id`, or refuse if a live one exists.
    #[method(name = "getNonce")]
    async fn get_nonce(&self, card_id: String) -> RpcResult<String>;

    /// Consume a nonce, verify the card's signature, and return a balance
    /// ciphertext sealed for the named HSM.
    #[method(name = "checkBalance")]
    async fn check_balance(
        &self,
        card_id: String,
        nonce: String,
        sig: String,
        hsm_id: String,
        hsm_nonce: String,
    ) -> RpcResult<String>;

    /// As `check_balance`, but also decrements the card's balance and the
    /// ATM's bill stock, returning a withdrawal-authorization ciphertext.
    #[method(name = "withdraw")]
    async fn withdraw(
        &self,
        card_id: String,
        nonce: String,
        sig: String,
        hsm_id: String,
        hsm_nonce: String,
        amount: u32,
    ) -> RpcResult<String>;

    /// As `check_balance`, but replaces the card's public key on success.
    #[method(name = "changePin")]
    async fn change_pin(
        &self,
        card_id: String,
        nonce: String,
        sig: String,
        new_pk: String,
    ) -> RpcResult<String>;

    /// Write-once: record `pk` for `card_id` iff it has none yet.
    #[method(name = "setFirstPk")]
    async fn set_first_pk(&self, card_id: String, pk: String) -> RpcResult<bool>;

    /// Write-once: record the ATM's initial bill stock iff unset.
    #[method(name = "setInitialNumBills")]
    async fn set_initial_num_bills(&self, hsm_id: String, n: u32) -> RpcResult<bool>;

    /// Write-once: record the symmetric key the bank shares with `hsm_id`.
    #[method(name = "setHsmKey")]
    async fn set_hsm_key(&self, hsm_id: String, key: String) -> RpcResult<bool>;
}
