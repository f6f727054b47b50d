//! Wire opcodes shared by `atm-device`, `atm-card`, and `atm-hsm`.
//!
//! One enumeration, one source of truth: module-level opcode constants live
//! in a single place all three participants (card, HSM, link) import from.

pub const REQUEST_NAME: u8 = 0x00;
pub const RETURN_NAME: u8 = 0x01;

pub const REQUEST_CARD_SIGNATURE: u8 = 0x02;
pub const RETURN_CARD_SIGNATURE: u8 = 0x03;

pub const REQUEST_HSM_NONCE: u8 = 0x04;
pub const RETURN_HSM_NONCE: u8 = 0x05;

pub const REQUEST_HSM_UUID: u8 = 0x06;
pub const RETURN_HSM_UUID: u8 = 0x07;

pub const REQUEST_WITHDRAWAL: u8 = 0x08;
pub const RETURN_WITHDRAWAL: u8 = 0x09;

pub const REQUEST_BALANCE: u8 = 0x0A;
pub const RETURN_BALANCE: u8 = 0x0B;

pub const REQUEST_NEW_PK: u8 = 0x0C;
pub const RETURN_NEW_PK: u8 = 0x0D;

/// Provisioning opcodes. Unassigned by the gathered drafts; fixed here in
/// the unused 0x0E–0x14 gap (documented in DESIGN.md).
pub const REQUEST_PROVISION: u8 = 0x0E;
pub const BILLS_REQUEST: u8 = 0x0F;
pub const BILL_RECEIVED: u8 = 0x10;
pub const INITIATE_BILLS_REQUEST: u8 = 0x11;

pub const SYNC_REQUEST_PROV: u8 = 0x15;
pub const SYNC_REQUEST_NO_PROV: u8 = 0x16;
pub const SYNC_CONFIRMED_PROV: u8 = 0x17;
pub const SYNC_CONFIRMED_NO_PROV: u8 = 0x18;
pub const SYNC_FAILED_NO_PROV: u8 = 0x19;
pub const SYNC_FAILED_PROV: u8 = 0x1A;
pub const SYNCED: u8 = 0x1B;

pub const SYNC_TYPE_HSM_N: u8 = 0x1C;
pub const SYNC_TYPE_CARD_N: u8 = 0x1D;
pub const SYNC_TYPE_HSM_P: u8 = SYNC_TYPE_HSM_N | 0x20;
pub const SYNC_TYPE_CARD_P: u8 = SYNC_TYPE_CARD_N | 0x20;

pub const PSOC_DEVICE_REQUEST: u8 = 0x1E;

pub const ACCEPTED: u8 = 0x20;
pub const REJECTED: u8 = 0x21;
