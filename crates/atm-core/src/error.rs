use thiserror::Error;

/// Error taxonomy for the ATM protocol core.
///
/// Grouped into device-absence, protocol-refusal, bank-refusal,
/// input-validation, and database-integrity buckets; the orchestrator
/// collapses all of them into a boolean failure at the RPC boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AtmError {
    // ── Device absence ────────────────────────────────────────────────────────
    #[error("device was removed during an I/O operation")]
    DeviceRemoved,

    #[error("device has not been provisioned")]
    NotProvisioned,

    #[error("device is already provisioned")]
    AlreadyProvisioned,

    // ── Protocol refusal ──────────────────────────────────────────────────────
    #[error("peripheral returned an unexpected reply tag: {0:#04x}")]
    UnexpectedTag(u8),

    #[error("HSM operations were called out of the required get_uuid/get_nonce alternation")]
    HsmOutOfSequence,

    #[error("card rejected the request (wrong PIN or signature)")]
    CardRefused,

    #[error("HSM rejected the ciphertext (authentication failure)")]
    HsmRefused,

    // ── Bank refusal ───────────────────────────────────────────────────────────
    #[error("unknown card: {0}")]
    UnknownCard(String),

    #[error("unknown hsm: {0}")]
    UnknownHsm(String),

    #[error("no live nonce to redeem for this card")]
    NoLiveNonce,

    #[error("a live, unexpired nonce already exists for this card")]
    NonceStillLive,

    #[error("nonce does not match the one on record")]
    NonceMismatch,

    #[error("nonce has already been redeemed")]
    NonceAlreadyUsed,

    #[error("nonce has expired")]
    NonceExpired,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("insufficient card balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("insufficient bills in ATM: have {have}, need {need}")]
    InsufficientBills { have: u32, need: u32 },

    #[error("card already has a public key on file")]
    PublicKeyAlreadySet,

    #[error("atm already has its initial bill count on file")]
    NumBillsAlreadySet,

    #[error("atm already has a shared hsm key on file")]
    HsmKeyAlreadySet,

    // ── Input validation ──────────────────────────────────────────────────────
    #[error("invalid {what} length: expected {expected}, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid id length: expected {expected}, got {got}")]
    InvalidIdLength { expected: usize, got: usize },

    #[error("invalid id format: {0}")]
    InvalidIdFormat(String),

    #[error("amount must be a non-negative integer")]
    InvalidAmount,

    // ── Database integrity ────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Transport ──────────────────────────────────────────────────────────────
    #[error("cryptographic sealing failure: {0}")]
    Seal(String),

    #[error("{0}")]
    Other(String),
}

impl AtmError {
    /// Render as a bank RPC reply: any failure is surfaced as a string
    /// beginning with `"ERROR"`.
    pub fn as_bank_reply(&self) -> String {
        format!("ERROR: {self}")
    }
}
