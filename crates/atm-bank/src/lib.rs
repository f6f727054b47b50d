pub mod db;
pub mod model;
pub mod rpc;
pub mod verifier;

pub use db::StateDb;
pub use model::{AtmRecord, CardRecord, NonceState};
pub use rpc::{AdminRpcServer, BankRpcServer};
pub use verifier::BankVerifier;
