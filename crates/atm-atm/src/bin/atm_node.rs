//! atm-node — the ATM-side process.
//!
//! Owns the CARD and HSM `DeviceLink`s, spawns their attach/detach watchers,
//! and serves `AtmOrchestrator`'s customer operations plus the provisioning
//! entry points behind `AtmApi`, talking to the bank over
//! `BankApi`/`AdminApi`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use atm_atm::{AtmRpcServer, BankRpcClient};
use atm_card::CardProxy;
use atm_device::{DeviceLink, DeviceRole, RealPortSource};
use atm_hsm::HsmProxy;

#[derive(Parser, Debug)]
#[command(name = "atm-node", version, about = "ATM protocol core — ATM-side node")]
struct Args {
    /// Listen address for this node's own `AtmApi` (teller front-end or CLI).
    #[arg(long, default_value = "127.0.0.1:9100")]
    listen_addr: SocketAddr,

    /// Bank's customer-facing `BankApi` URL.
    #[arg(long, default_value = "http://127.0.0.1:9000")]
    bank_url: String,

    /// Bank's administrator `AdminApi` URL (used only by provisioning calls).
    #[arg(long, default_value = "http://127.0.0.1:9001")]
    admin_url: String,
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
    info!("atm-node starting");

    let card_link = DeviceLink::new(DeviceRole::Card, Box::new(RealPortSource));
    let hsm_link = DeviceLink::new(DeviceRole::Hsm, Box::new(RealPortSource));
    card_link.spawn_watcher();
    hsm_link.spawn_watcher();

    let card = Arc::new(CardProxy::new(card_link));
    let hsm = Arc::new(HsmProxy::new(hsm_link));
    let bank = Arc::new(
        BankRpcClient::new(&args.bank_url, &args.admin_url).context("building bank RPC client")?,
    );

    let handle = AtmRpcServer::new(card, hsm, bank)
        .start(args.listen_addr)
        .await
        .context("starting ATM RPC server")?;

    info!(listen_addr = %args.listen_addr, bank_url = %args.bank_url, "atm-node ready");
    handle.stopped().await;
    Ok(())
}
