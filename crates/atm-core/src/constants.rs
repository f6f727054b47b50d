//! ─── ATM Protocol Constants ─────────────────────────────────────────────────
//!
//! Anything not pinned down by a literal on the wire (the gap opcodes, the
//! watcher poll interval) is fixed here and asserted by the wire-format
//! tests in `opcodes`.

/// A card nonce is redeemable for this many seconds after `get_nonce` issues it.
pub const NONCE_VALIDITY_SECS: i64 = 5;

/// Fixed PIN length in bytes (ASCII digits, not NUL-terminated).
pub const PIN_LEN: usize = 8;

/// Canonical UUID string length ("xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx").
pub const UUID_STR_LEN: usize = 36;

/// Card/HSM nonce length in bytes.
pub const NONCE_LEN: usize = 32;

/// Ed25519-style card public key length in bytes.
pub const CARD_PK_LEN: usize = 32;

/// Card signature length in bytes.
pub const CARD_SIG_LEN: usize = 64;

/// One dispensable bill, opaque to the protocol.
pub const BILL_LEN: usize = 16;

/// Provisioning blob length: r[32] ‖ rand_key[32] ‖ id[36].
pub const PROVISION_BLOB_LEN: usize = 32 + 32 + UUID_STR_LEN;

/// Serial baud rate for both CARD and HSM links.
pub const SERIAL_BAUD_RATE: u32 = 115_200;

/// Quiet period observed after a write, to accommodate peripheral buffering.
pub const POST_WRITE_QUIET_MS: u64 = 100;

/// Read timeout on the serial port.
pub const SERIAL_READ_TIMEOUT_MS: u64 = 1_000;

/// Port-enumeration poll interval for the attach/detach watcher.
pub const WATCHER_POLL_MS: u64 = 250;
