pub mod admin_api;
pub mod atm_api;
pub mod bank_api;

pub use admin_api::{AdminApiClient, AdminApiServer};
pub use atm_api::{AtmApiClient, AtmApiServer};
pub use bank_api::{BankApiClient, BankApiServer};
