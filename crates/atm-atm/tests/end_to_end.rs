//! End-to-end test for the ATM protocol core.
//!
//! Starts a real `atm-bank-server` child process against a fresh `sled`
//! database and drives the customer-facing scenarios over genuine JSON-RPC: real
//! HTTP round trips for every bank interaction, with the CARD/HSM side
//! faked via scripted `FakeSerial` transports (no physical peripheral is
//! available in CI). Uses a `NodeGuard` owning a child process, a free-port
//! helper, and a readiness poll before the scenario runs.
//!
//! Run with (the bank-server binary must be built alongside atm-atm's tests,
//! so a workspace-wide build is required):
//!   cargo test --workspace --test end_to_end

use std::io;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

use atm_atm::{AtmRpcServer, BankRpcClient};
use atm_card::CardProxy;
use atm_core::constants::{BILL_LEN, CARD_SIG_LEN, NONCE_LEN};
use atm_core::{opcodes, Nonce32};
use atm_crypto::CardSigner;
use atm_device::{DeviceLink, DeviceRole, FakeSerial, PortSource, SerialTransport};
use atm_hsm::HsmProxy;
use atm_rpc::{AdminApiClient, AtmApiServer, BankApiClient};

// ── bank process lifecycle ───────────────────────────────────────────────────

struct BankGuard {
    child: Child,
    db_dir: PathBuf,
}

impl Drop for BankGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.db_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn wait_for_bank_ready(admin: &HttpClient, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if AdminApiClient::ready_for_atm(admin, "nonexistent".to_string())
            .await
            .is_ok()
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

// ── FakeSerial harness (mirrors atm-atm::orchestrator's inline test doubles) ─

struct FixedPortSource {
    transport: StdMutex<Option<FakeSerial>>,
}

impl PortSource for FixedPortSource {
    fn list(&self) -> Vec<String> {
        vec!["COM-FAKE".to_string()]
    }

    fn open(&self, _port_name: &str) -> io::Result<Box<dyn SerialTransport>> {
        Ok(Box::new(
            self.transport.lock().unwrap().take().expect("taken twice"),
        ))
    }
}

fn attached_card(mut fake: FakeSerial, identity_tag: u8) -> Arc<CardProxy> {
    fake.push_inbound(&[identity_tag]);
    let source = FixedPortSource {
        transport: StdMutex::new(Some(fake)),
    };
    let link = DeviceLink::new(DeviceRole::Card, Box::new(source));
    link.open("COM-FAKE").unwrap();
    Arc::new(CardProxy::new(link))
}

fn attached_hsm(mut fake: FakeSerial, identity_tag: u8) -> Arc<HsmProxy> {
    fake.push_inbound(&[identity_tag]);
    let source = FixedPortSource {
        transport: StdMutex::new(Some(fake)),
    };
    let link = DeviceLink::new(DeviceRole::Hsm, Box::new(source));
    link.open("COM-FAKE").unwrap();
    Arc::new(HsmProxy::new(link))
}

/// Scripts a blank card's `provision` round: unprovisioned identity,
/// sync confirms no-provision, the peripheral accepts the write, then a
/// second (`Normal`) sync round in which the card reports the public key
/// its PIN actually derives to, the value `provision_card_inner` forwards
/// to `set_first_pk`.
fn card_fake_for_provision(pk: &atm_core::CardPublicKey) -> FakeSerial {
    let mut fake = FakeSerial::new();
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_NO_PROV]);
    fake.push_inbound(&[opcodes::ACCEPTED]);
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_NEW_PK]);
    fake.push_inbound(pk.as_bytes());
    fake
}

/// Scripts a blank HSM's `provision` round: sync, then the
/// bill-by-bill handshake, then the final accept.
fn hsm_fake_for_provision(num_bills: usize) -> FakeSerial {
    let mut fake = FakeSerial::new();
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_NO_PROV]);
    fake.push_inbound(&[opcodes::BILLS_REQUEST]);
    for _ in 0..num_bills {
        fake.push_inbound(&[opcodes::BILL_RECEIVED]);
    }
    fake.push_inbound(&[opcodes::ACCEPTED]);
    fake
}

/// Scripts a provisioned card's `get_card_id` + `sign_nonce` round, the
/// sequence `check_balance`/`withdraw`/`change_pin` each drive once.
fn card_fake_for_id_then_sig(card_id: &str, sig: &atm_core::CardSignature) -> FakeSerial {
    let mut fake = FakeSerial::new();
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_NAME]);
    fake.push_inbound(card_id.as_bytes());
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_CARD_SIGNATURE]);
    fake.push_inbound(sig.as_bytes());
    fake
}

/// Scripts a provisioned card's `get_card_id` + `request_new_public_key`
/// + `sign_nonce` round, the sequence `change_pin` drives.
fn card_fake_for_change_pin(
    card_id: &str,
    new_pk: &atm_core::CardPublicKey,
    sig: &atm_core::CardSignature,
) -> FakeSerial {
    let mut fake = FakeSerial::new();
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_NAME]);
    fake.push_inbound(card_id.as_bytes());
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_NEW_PK]);
    fake.push_inbound(new_pk.as_bytes());
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_CARD_SIGNATURE]);
    fake.push_inbound(sig.as_bytes());
    fake
}

fn hsm_fake_for_balance(hsm_id: &str, balance: u32) -> FakeSerial {
    let mut fake = FakeSerial::new();
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_HSM_UUID]);
    fake.push_inbound(hsm_id.as_bytes());
    fake.push_inbound(&[opcodes::RETURN_HSM_NONCE]);
    fake.push_inbound(&[7u8; NONCE_LEN]);
    fake.push_inbound(&[opcodes::RETURN_BALANCE]);
    fake.push_inbound(&balance.to_be_bytes());
    fake
}

fn hsm_fake_for_withdrawal(hsm_id: &str, bills: &[[u8; BILL_LEN]]) -> FakeSerial {
    let mut fake = FakeSerial::new();
    fake.push_inbound(&[opcodes::SYNC_CONFIRMED_PROV]);
    fake.push_inbound(&[opcodes::RETURN_HSM_UUID]);
    fake.push_inbound(hsm_id.as_bytes());
    fake.push_inbound(&[opcodes::RETURN_HSM_NONCE]);
    fake.push_inbound(&[7u8; NONCE_LEN]);
    fake.push_inbound(&[opcodes::RETURN_WITHDRAWAL, bills.len() as u8]);
    for b in bills {
        fake.push_inbound(b);
    }
    fake
}

const CARD_ID: &str = "11111111-1111-1111-1111-111111111111";
const HSM_ID: &str = "22222222-2222-2222-2222-222222222222";
const PIN: &[u8; 8] = b"12345678";
const NEW_PIN: &[u8; 8] = b"87654321";

#[tokio::test]
async fn full_provision_and_customer_round_trip() {
    // ── 1. Spin up a real bank process against a fresh db ────────────────────
    let db_dir = std::env::temp_dir().join(format!("atm_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&db_dir);
    std::fs::create_dir_all(&db_dir).unwrap();

    let bank_port = free_port();
    let admin_port = free_port();
    let bank_url = format!("http://127.0.0.1:{bank_port}");
    let admin_url = format!("http://127.0.0.1:{admin_port}");

    // `CARGO_BIN_EXE_<name>` is only set for binaries in the current
    // package; `atm-bank-server` lives in `atm-bank`. All workspace
    // binaries land in the same target directory, so the sibling of a
    // same-package binary finds it.
    let own_bin = PathBuf::from(env!("CARGO_BIN_EXE_atm-provision"));
    let bank_bin = own_bin
        .parent()
        .expect("binary has a parent dir")
        .join(format!("atm-bank-server{}", std::env::consts::EXE_SUFFIX));
    let child = Command::new(&bank_bin)
        .args([
            "--db-path",
            db_dir.to_str().unwrap(),
            "--bank-addr",
            &format!("127.0.0.1:{bank_port}"),
            "--admin-addr",
            &format!("127.0.0.1:{admin_port}"),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn atm-bank-server");
    let _guard = BankGuard { child, db_dir };

    let admin = HttpClientBuilder::default().build(&admin_url).unwrap();
    let bank_rpc = HttpClientBuilder::default().build(&bank_url).unwrap();
    assert!(
        wait_for_bank_ready(&admin, Duration::from_secs(10)).await,
        "atm-bank-server did not become ready within 10 seconds"
    );

    // ── 2. Admin opens a blank card and a blank ATM ───────────────────────────
    assert!(AdminApiClient::create_account(
        &admin,
        CARD_ID.to_string(),
        "alice".to_string(),
        100,
    )
    .await
    .unwrap());
    assert!(AdminApiClient::create_atm(&admin, HSM_ID.to_string())
        .await
        .unwrap());

    // ── 3. Provision the card and the ATM through a real AtmRpcServer ─────────
    let bank_client = Arc::new(BankRpcClient::new(&bank_url, &admin_url).unwrap());

    let r = [1u8; 32];
    let rand_key_card = [2u8; 32];
    let mut card_blob = Vec::with_capacity(32 + 32 + CARD_ID.len());
    card_blob.extend_from_slice(&r);
    card_blob.extend_from_slice(&rand_key_card);
    card_blob.extend_from_slice(CARD_ID.as_bytes());

    let hsm_key = [3u8; 32];
    let rand_key_hsm = [4u8; 32];
    let mut hsm_blob = Vec::with_capacity(32 + 32 + HSM_ID.len());
    hsm_blob.extend_from_slice(&hsm_key);
    hsm_blob.extend_from_slice(&rand_key_hsm);
    hsm_blob.extend_from_slice(HSM_ID.as_bytes());

    let bills: Vec<[u8; BILL_LEN]> = vec![[0xAAu8; BILL_LEN], [0xBBu8; BILL_LEN], [0xCCu8; BILL_LEN]];
    let bill_hexes: Vec<String> = bills.iter().map(|b| hex::encode(b)).collect();

    // The PIN's derived key is what the real card would report over the wire
    // via `request_new_public_key`; the fake below stands in for that device
    // round trip rather than letting the bank register a value the ATM
    // backend computed on its own.
    let card_pk = CardSigner::from_pin(PIN).public_key();
    let provision_card =
        attached_card(card_fake_for_provision(&card_pk), opcodes::SYNC_TYPE_CARD_N);
    let provision_hsm = attached_hsm(hsm_fake_for_provision(bills.len()), opcodes::SYNC_TYPE_HSM_N);
    let provisioning_server =
        AtmRpcServer::new(provision_card, provision_hsm, Arc::clone(&bank_client));

    assert!(
        provisioning_server
            .provision_card(hex::encode(&card_blob), String::from_utf8(PIN.to_vec()).unwrap())
            .await
            .unwrap(),
        "card provisioning should succeed"
    );
    assert!(
        provisioning_server
            .provision_atm(hex::encode(&hsm_blob), bill_hexes)
            .await
            .unwrap(),
        "ATM provisioning should succeed"
    );
    assert!(AdminApiClient::ready_for_atm(&admin, HSM_ID.to_string())
        .await
        .unwrap());

    // ── 4. check_balance over real JSON-RPC, faked CARD/HSM ──────────────────
    let signer = CardSigner::from_pin(PIN);
    let check_balance_sig = {
        // sign whatever nonce the bank will actually issue next.
        let nonce_hex = BankApiClient::get_nonce(&bank_rpc, CARD_ID.to_string())
            .await
            .unwrap();
        // put the nonce back (it is still live) by not consuming it here;
        // the orchestrator will call get_nonce again and receive the same
        // value since it has not yet been spent.
        let bytes = hex::decode(&nonce_hex).unwrap();
        let nonce = Nonce32::from_slice(&bytes).unwrap();
        signer.sign_nonce(&nonce)
    };
    let card1 = attached_card(
        card_fake_for_id_then_sig(CARD_ID, &check_balance_sig),
        opcodes::SYNC_TYPE_CARD_P,
    );
    let hsm1 = attached_hsm(hsm_fake_for_balance(HSM_ID, 100), opcodes::SYNC_TYPE_HSM_P);
    let server1 = AtmRpcServer::new(card1, hsm1, Arc::clone(&bank_client));

    let balance = server1
        .check_balance(String::from_utf8(PIN.to_vec()).unwrap())
        .await
        .unwrap();
    assert_eq!(balance, Some(100));

    // ── 5. withdraw decrements the bank's balance and bill stock ──────────────
    let withdraw_sig = {
        let nonce_hex = BankApiClient::get_nonce(&bank_rpc, CARD_ID.to_string())
            .await
            .unwrap();
        let bytes = hex::decode(&nonce_hex).unwrap();
        let nonce = Nonce32::from_slice(&bytes).unwrap();
        signer.sign_nonce(&nonce)
    };
    let withdrawal_bills = [bills[0], bills[1]];
    let card2 = attached_card(
        card_fake_for_id_then_sig(CARD_ID, &withdraw_sig),
        opcodes::SYNC_TYPE_CARD_P,
    );
    let hsm2 = attached_hsm(
        hsm_fake_for_withdrawal(HSM_ID, &withdrawal_bills),
        opcodes::SYNC_TYPE_HSM_P,
    );
    let server2 = AtmRpcServer::new(card2, hsm2, Arc::clone(&bank_client));

    let dispensed = server2
        .withdraw(String::from_utf8(PIN.to_vec()).unwrap(), 2)
        .await
        .unwrap()
        .expect("withdrawal should succeed");
    assert_eq!(dispensed.len(), 2);

    let remaining = AdminApiClient::admin_check_balance(&admin, CARD_ID.to_string())
        .await
        .unwrap();
    assert_eq!(remaining, Some(98), "withdrawing 2 bills should leave 98");

    // ── 6. a consumed nonce cannot be replayed ──────────────────────────────
    let nonce_hex = BankApiClient::get_nonce(&bank_rpc, CARD_ID.to_string())
        .await
        .unwrap();
    let nonce_bytes = hex::decode(&nonce_hex).unwrap();
    let nonce = Nonce32::from_slice(&nonce_bytes).unwrap();
    let sig = signer.sign_nonce(&nonce);

    let first = BankApiClient::check_balance(
        &bank_rpc,
        CARD_ID.to_string(),
        nonce_hex.clone(),
        hex::encode(sig.as_bytes()),
        HSM_ID.to_string(),
        hex::encode([7u8; NONCE_LEN]),
    )
    .await
    .unwrap();
    assert!(!first.starts_with("ERROR"), "first use of a fresh nonce should succeed");

    let replay = BankApiClient::check_balance(
        &bank_rpc,
        CARD_ID.to_string(),
        nonce_hex,
        hex::encode(sig.as_bytes()),
        HSM_ID.to_string(),
        hex::encode([7u8; NONCE_LEN]),
    )
    .await
    .unwrap();
    assert!(replay.starts_with("ERROR"), "a consumed nonce must not be replayable");

    // ── 7. withdrawing more than the balance leaves state unchanged ─────────
    let over_sig = {
        let nonce_hex = BankApiClient::get_nonce(&bank_rpc, CARD_ID.to_string())
            .await
            .unwrap();
        let bytes = hex::decode(&nonce_hex).unwrap();
        let nonce = Nonce32::from_slice(&bytes).unwrap();
        signer.sign_nonce(&nonce)
    };
    let card3 = attached_card(
        card_fake_for_id_then_sig(CARD_ID, &over_sig),
        opcodes::SYNC_TYPE_CARD_P,
    );
    // No HSM script needed: the bank must refuse before any HSM handoff.
    let hsm3 = attached_hsm(FakeSerial::new(), opcodes::SYNC_TYPE_HSM_P);
    let server3 = AtmRpcServer::new(card3, hsm3, Arc::clone(&bank_client));
    let over_withdraw = server3
        .withdraw(String::from_utf8(PIN.to_vec()).unwrap(), 1_000)
        .await
        .unwrap();
    assert_eq!(over_withdraw, None, "withdrawing more than the balance must be refused");

    let unchanged = AdminApiClient::admin_check_balance(&admin, CARD_ID.to_string())
        .await
        .unwrap();
    assert_eq!(unchanged, Some(98), "a refused withdrawal must not touch the balance");

    // ── 8. change_pin replaces the card's key, old PIN then stops working ─────
    let new_signer = CardSigner::from_pin(NEW_PIN);
    let new_pk = new_signer.public_key();
    let change_pin_sig = {
        let nonce_hex = BankApiClient::get_nonce(&bank_rpc, CARD_ID.to_string())
            .await
            .unwrap();
        let bytes = hex::decode(&nonce_hex).unwrap();
        let nonce = Nonce32::from_slice(&bytes).unwrap();
        signer.sign_nonce(&nonce)
    };
    let card4 = attached_card(
        card_fake_for_change_pin(CARD_ID, &new_pk, &change_pin_sig),
        opcodes::SYNC_TYPE_CARD_P,
    );
    let hsm4 = attached_hsm(FakeSerial::new(), opcodes::SYNC_TYPE_HSM_P);
    let server4 = AtmRpcServer::new(card4, hsm4, Arc::clone(&bank_client));
    assert!(
        server4
            .change_pin(
                String::from_utf8(PIN.to_vec()).unwrap(),
                String::from_utf8(NEW_PIN.to_vec()).unwrap(),
            )
            .await
            .unwrap(),
        "change_pin with the correct old PIN should succeed"
    );

    let stale_sig = {
        let nonce_hex = BankApiClient::get_nonce(&bank_rpc, CARD_ID.to_string())
            .await
            .unwrap();
        let bytes = hex::decode(&nonce_hex).unwrap();
        let nonce = Nonce32::from_slice(&bytes).unwrap();
        signer.sign_nonce(&nonce)
    };
    let card5 = attached_card(
        card_fake_for_id_then_sig(CARD_ID, &stale_sig),
        opcodes::SYNC_TYPE_CARD_P,
    );
    let hsm5 = attached_hsm(hsm_fake_for_balance(HSM_ID, 98), opcodes::SYNC_TYPE_HSM_P);
    let server5 = AtmRpcServer::new(card5, hsm5, Arc::clone(&bank_client));
    let balance_with_old_pin = server5
        .check_balance(String::from_utf8(PIN.to_vec()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        balance_with_old_pin, None,
        "the old PIN's key must no longer verify once change_pin has succeeded"
    );

    let _ = CARD_SIG_LEN; // referenced only to keep the import honest if scripts change
}
