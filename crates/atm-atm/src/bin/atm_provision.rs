//! atm-provision — the one-time device provisioning CLI.
//!
//! Mints the identity/keying material for a blank card or HSM, registers the
//! blank record with the bank's admin surface, then drives the device
//! provisioning round through a running `atm-node`'s `AtmApi`. Plays the
//! same role as an RPC-exposed provisioning tool talking to a bank and a
//! device; here it is a CLI talking to the already-running
//! `atm-node`/`atm-bank-server` processes instead of embedding device
//! access itself.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use rand::{thread_rng, Rng};
use tracing::info;

use atm_core::constants::{BILL_LEN, PIN_LEN};
use atm_rpc::{AdminApiClient, AtmApiClient};

#[derive(Parser, Debug)]
#[command(name = "atm-provision", version, about = "ATM protocol core — one-time device provisioning CLI")]
struct Args {
    /// Running `atm-node`'s `AtmApi` URL.
    #[arg(long, default_value = "http://127.0.0.1:9100")]
    atm_url: String,

    /// Bank's administrator `AdminApi` URL.
    #[arg(long, default_value = "http://127.0.0.1:9001")]
    admin_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a blank card inserted into the ATM's CARD link.
    Card {
        /// Administrator-assigned account label.
        #[arg(long)]
        account_name: String,
        /// Initial balance, in bills.
        #[arg(long)]
        balance: u64,
        /// Initial 8-character PIN.
        #[arg(long)]
        pin: String,
    },
    /// Provision a blank HSM inserted into the ATM's HSM link.
    Atm {
        /// Number of bills to seed the HSM's bill stock with.
        #[arg(long)]
        bills: u8,
    },
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
    let atm = HttpClientBuilder::default()
        .build(&args.atm_url)
        .context("building atm-node RPC client")?;
    let admin = HttpClientBuilder::default()
        .build(&args.admin_url)
        .context("building admin RPC client")?;

    match args.command {
        Command::Card {
            account_name,
            balance,
            pin,
        } => provision_card(&atm, &admin, &account_name, balance, &pin).await,
        Command::Atm { bills } => provision_atm(&atm, &admin, bills).await,
    }
}

async fn provision_card(
    atm: &HttpClient,
    admin: &HttpClient,
    account_name: &str,
    balance: u64,
    pin: &str,
) -> anyhow::Result<()> {
    if pin.len() != PIN_LEN {
        bail!("pin must be exactly {PIN_LEN} characters, got {}", pin.len());
    }

    let card_id = uuid::Uuid::new_v4().to_string();
    if !admin
        .create_account(card_id.clone(), account_name.to_string(), balance)
        .await
        .context("admin create_account")?
    {
        bail!("bank refused to create account {card_id}");
    }
    info!(card_id, "account created");

    let mut rng = thread_rng();
    let r: [u8; 32] = rng.gen();
    let rand_key: [u8; 32] = rng.gen();
    let mut blob = Vec::with_capacity(32 + 32 + card_id.len());
    blob.extend_from_slice(&r);
    blob.extend_from_slice(&rand_key);
    blob.extend_from_slice(card_id.as_bytes());

    let ok = atm
        .provision_card(hex::encode(blob), pin.to_string())
        .await
        .context("atm provision_card")?;
    if !ok {
        bail!("device/bank refused to provision card {card_id}");
    }
    println!("provisioned card {card_id}");
    Ok(())
}

async fn provision_atm(atm: &HttpClient, admin: &HttpClient, num_bills: u8) -> anyhow::Result<()> {
    let hsm_id = uuid::Uuid::new_v4().to_string();
    if !admin
        .create_atm(hsm_id.clone())
        .await
        .context("admin create_atm")?
    {
        bail!("bank refused to create atm {hsm_id}");
    }
    info!(hsm_id, "atm record created");

    let mut rng = thread_rng();
    let hsm_key: [u8; 32] = rng.gen();
    let rand_key: [u8; 32] = rng.gen();
    let mut blob = Vec::with_capacity(32 + 32 + hsm_id.len());
    blob.extend_from_slice(&hsm_key);
    blob.extend_from_slice(&rand_key);
    blob.extend_from_slice(hsm_id.as_bytes());

    let bills: Vec<String> = (0..num_bills)
        .map(|_| {
            let bill: [u8; BILL_LEN] = rng.gen();
            hex::encode(bill)
        })
        .collect();

    let ok = atm
        .provision_atm(hex::encode(blob), bills)
        .await
        .context("atm provision_atm")?;
    if !ok {
        bail!("device/bank refused to provision atm {hsm_id}");
    }
    println!("provisioned atm {hsm_id} with {num_bills} bills");
    Ok(())
}
