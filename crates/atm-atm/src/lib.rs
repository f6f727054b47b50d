pub mod orchestrator;
pub mod rpc_client;
pub mod rpc_server;

pub use orchestrator::AtmOrchestrator;
pub use rpc_client::{BankHandle, BankRpcClient};
pub use rpc_server::AtmRpcServer;
