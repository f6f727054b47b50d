//! atm-bank-server — the bank's JSON-RPC 2.0 process.
//!
//! Opens the sled-backed card/ATM database, then serves the customer-facing
//! `BankApi` on one listen address and the administrator `AdminApi` on a
//! second: the two surfaces share a single `BankVerifier`, and hence
//! a single process-wide database mutex, so a write on one port is visible
//! to the other immediately.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use atm_bank::{AdminRpcServer, BankRpcServer, BankVerifier, StateDb};

#[derive(Parser, Debug)]
#[command(
    name = "atm-bank-server",
    version,
    about = "ATM protocol core — bank-side JSON-RPC server"
)]
struct Args {
    /// Directory for the sled-backed card/ATM database.
    #[arg(long, default_value = "./data/bank-db")]
    db_path: PathBuf,

    /// Listen address for the customer-facing `BankApi`.
    #[arg(long, default_value = "127.0.0.1:9000")]
    bank_addr: SocketAddr,

    /// Listen address for the administrator `AdminApi`.
    #[arg(long, default_value = "127.0.0.1:9001")]
    admin_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,atm=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("atm-bank-server starting");

    std::fs::create_dir_all(&args.db_path)
        .with_context(|| format!("creating db dir {}", args.db_path.display()))?;
    let db = StateDb::open(&args.db_path).context("opening bank database")?;
    let verifier = Arc::new(BankVerifier::new(db));

    let bank_handle = BankRpcServer::new(Arc::clone(&verifier))
        .start(args.bank_addr)
        .await
        .context("starting bank RPC server")?;
    let admin_handle = AdminRpcServer::new(Arc::clone(&verifier))
        .start(args.admin_addr)
        .await
        .context("starting admin RPC server")?;

    info!(bank_addr = %args.bank_addr, admin_addr = %args.admin_addr, "atm-bank-server ready");

    // Run until either server stops (e.g. bind failure recovery, shutdown signal).
    tokio::select! {
        _ = bank_handle.stopped() => {}
        _ = admin_handle.stopped() => {}
    }
    Ok(())
}
