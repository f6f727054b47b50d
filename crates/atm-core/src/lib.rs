pub mod constants;
pub mod error;
pub mod opcodes;
pub mod types;

pub use error::AtmError;
pub use types::{
    Bill, BillCount, CardId, CardPublicKey, CardSignature, HsmId, Nonce32, Timestamp,
};
