//! `HsmProxy`: the HSM-side operations of the serial protocol.
//!
//! `get_uuid`/`get_nonce` must strictly precede `handle_balance_check` or
//! `handle_withdrawal`; calling them out of order desynchronizes the
//! peripheral. `phase` below enforces that ordering in software so
//! a programming mistake in the orchestrator fails fast with
//! `HsmOutOfSequence` instead of silently corrupting the wire.

use std::sync::{Arc, Mutex};

use atm_core::constants::{BILL_LEN, NONCE_LEN, UUID_STR_LEN};
use atm_core::{opcodes, AtmError, Bill, HsmId, Nonce32};
use atm_device::{DeviceLink, SyncMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingUuid,
    AwaitingNonce,
    AwaitingHandle,
}

/// An HSM-role `DeviceLink`, wrapped with the HSM's protocol operations.
pub struct HsmProxy {
    link: Arc<DeviceLink>,
    phase: Mutex<Phase>,
}

impl HsmProxy {
    pub fn new(link: Arc<DeviceLink>) -> Self {
        Self {
            link,
            phase: Mutex::new(Phase::AwaitingUuid),
        }
    }

    fn check_and_advance(&self, expected: Phase, next: Phase) -> Result<(), AtmError> {
        let mut phase = self.phase.lock().expect("hsm phase mutex poisoned");
        if *phase != expected {
            return Err(AtmError::HsmOutOfSequence);
        }
        *phase = next;
        Ok(())
    }

    /// `get_uuid`. Must be the first call of a fresh round.
    pub fn get_uuid(&self) -> Result<HsmId, AtmError> {
        self.check_and_advance(Phase::AwaitingUuid, Phase::AwaitingNonce)?;
        self.link.sync(SyncMode::Normal)?;
        let reply = self
            .link
            .request_reply(&[opcodes::REQUEST_HSM_UUID], 1 + UUID_STR_LEN)?;
        let (tag, body) = split_tag(&reply)?;
        if tag != opcodes::RETURN_HSM_UUID {
            return Err(AtmError::HsmRefused);
        }
        let id_str = std::str::from_utf8(body).map_err(|_| AtmError::HsmRefused)?;
        HsmId::new(id_str)
    }

    /// `get_nonce`. Must follow `get_uuid` in the same round.
    pub fn get_nonce(&self) -> Result<Nonce32, AtmError> {
        self.check_and_advance(Phase::AwaitingNonce, Phase::AwaitingHandle)?;
        let reply = self
            .link
            .request_reply(&[opcodes::REQUEST_HSM_NONCE], 1 + NONCE_LEN)?;
        let (tag, body) = split_tag(&reply)?;
        if tag != opcodes::RETURN_HSM_NONCE {
            return Err(AtmError::HsmRefused);
        }
        Nonce32::from_slice(body)
    }

    /// `handle_balance_check`. The HSM decrypts `ct`, verifies it was
    /// sealed for its own nonce, and returns the plaintext balance.
    pub fn handle_balance_check(&self, ct: &[u8]) -> Result<u32, AtmError> {
        self.check_and_advance(Phase::AwaitingHandle, Phase::AwaitingUuid)?;
        let mut request = Vec::with_capacity(1 + ct.len());
        request.push(opcodes::REQUEST_BALANCE);
        request.extend_from_slice(ct);
        let reply = self.link.request_reply(&request, 1 + 4)?;
        let (tag, body) = split_tag(&reply)?;
        if tag != opcodes::RETURN_BALANCE {
            return Err(AtmError::HsmRefused);
        }
        let mut be = [0u8; 4];
        be.copy_from_slice(body);
        Ok(u32::from_be_bytes(be))
    }

    /// `handle_withdrawal`. The reply's bill count is not known ahead
    /// of time, so the header (tag + count) is read before the variable-
    /// length bill payload.
    pub fn handle_withdrawal(&self, ct: &[u8]) -> Result<Vec<Bill>, AtmError> {
        self.check_and_advance(Phase::AwaitingHandle, Phase::AwaitingUuid)?;
        let mut request = Vec::with_capacity(1 + ct.len());
        request.push(opcodes::REQUEST_WITHDRAWAL);
        request.extend_from_slice(ct);
        self.link.write(&request)?;

        let header = self.link.read(2)?;
        if header[0] != opcodes::RETURN_WITHDRAWAL {
            return Err(AtmError::HsmRefused);
        }
        let count = header[1] as usize;
        let body = self.link.read(count * BILL_LEN)?;
        body.chunks_exact(BILL_LEN)
            .map(Bill::from_slice)
            .collect()
    }

    /// `provision`. Establishes the HSM's shared key, identity, and
    /// initial bill stock. Write-once: a provisioned HSM fails `sync` with
    /// `AlreadyProvisioned`.
    pub fn provision(
        &self,
        hsm_key: &[u8; 32],
        rand_key: &[u8; 32],
        hsm_id: &str,
        bills: &[Bill],
    ) -> Result<(), AtmError> {
        if hsm_id.len() != UUID_STR_LEN {
            return Err(AtmError::InvalidIdLength {
                expected: UUID_STR_LEN,
                got: hsm_id.len(),
            });
        }
        if bills.len() > u8::MAX as usize {
            return Err(AtmError::InvalidLength {
                what: "initial bill count",
                expected: u8::MAX as usize,
                got: bills.len(),
            });
        }

        self.link.sync(SyncMode::Provision)?;

        let mut request = Vec::with_capacity(1 + 32 + 32 + UUID_STR_LEN);
        request.push(opcodes::REQUEST_PROVISION);
        request.extend_from_slice(hsm_key);
        request.extend_from_slice(rand_key);
        request.extend_from_slice(hsm_id.as_bytes());
        self.link.write(&request)?;

        self.link
            .write(&[opcodes::INITIATE_BILLS_REQUEST, bills.len() as u8])?;
        let ack = self.link.read(1)?;
        if ack[0] != opcodes::BILLS_REQUEST {
            return Err(AtmError::UnexpectedTag(ack[0]));
        }

        for bill in bills {
            self.link.write(bill.as_bytes())?;
            let ack = self.link.read(1)?;
            if ack[0] != opcodes::BILL_RECEIVED {
                return Err(AtmError::UnexpectedTag(ack[0]));
            }
        }

        let finish = self.link.read(1)?;
        match finish[0] {
            opcodes::ACCEPTED => {
                *self.phase.lock().expect("hsm phase mutex poisoned") = Phase::AwaitingUuid;
                Ok(())
            }
            opcodes::REJECTED => Err(AtmError::HsmRefused),
            other => Err(AtmError::UnexpectedTag(other)),
        }
    }
}

fn split_tag(reply: &[u8]) -> Result<(u8, &[u8]), AtmError> {
    reply
        .split_first()
        .map(|(tag, body)| (*tag, body))
        .ok_or(AtmError::DeviceRemoved)
}
