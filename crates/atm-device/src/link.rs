//! `DeviceLink`: framed serial I/O to one PSoC peripheral, with dynamic
//! attach/detach and the provisioning-vs-operational sync handshake.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use atm_core::constants::{POST_WRITE_QUIET_MS, WATCHER_POLL_MS};
use atm_core::{opcodes, AtmError};

use crate::transport::{PortSource, SerialTransport};

/// Which peripheral role a link was declared to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Card,
    Hsm,
}

/// What the caller expects the peripheral's provisioning state to be,
/// going into a sync round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// The peripheral should NOT yet be provisioned.
    Provision,
    /// The peripheral should already be provisioned.
    Normal,
}

/// Lifecycle state of a `DeviceLink`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Searching,
    Syncing,
    Ready,
    InFlight,
    Closed,
}

struct LinkInner {
    state: LinkState,
    transport: Option<Box<dyn SerialTransport>>,
}

/// A serial link to a single USB-CDC peripheral (a CARD or an HSM).
///
/// All byte I/O goes through one mutex (`inner`), so at most one request is
/// ever in flight on the wire at a time — one outstanding request per link.
pub struct DeviceLink {
    role: DeviceRole,
    port_source: Box<dyn PortSource>,
    inner: Mutex<LinkInner>,
}

impl DeviceLink {
    pub fn new(role: DeviceRole, port_source: Box<dyn PortSource>) -> Arc<Self> {
        Arc::new(Self {
            role,
            port_source,
            inner: Mutex::new(LinkInner {
                state: LinkState::Searching,
                transport: None,
            }),
        })
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.inner.lock().expect("link mutex poisoned").state
    }

    /// True once a peripheral of the matching role has completed the
    /// identity handshake and is ready to serve a request.
    pub fn inserted(&self) -> bool {
        matches!(
            self.state(),
            LinkState::Ready | LinkState::Syncing | LinkState::InFlight
        )
    }

    /// Alias for `inserted`.
    pub fn connected(&self) -> bool {
        self.inserted()
    }

    /// Block until a peripheral is attached, polling at the watcher's rate.
    pub fn wait_for_insert(&self) {
        while !self.inserted() {
            thread::sleep(Duration::from_millis(WATCHER_POLL_MS));
        }
    }

    /// Drop the transport and return to `Searching`, as if the peripheral
    /// had been unplugged.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("link mutex poisoned");
        inner.transport = None;
        inner.state = LinkState::Searching;
    }

    /// Spawn the background attach/detach watcher for this link. Runs until
    /// the process exits; the watcher owns no state the caller needs back.
    pub fn spawn_watcher(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let link = Arc::clone(self);
        thread::spawn(move || {
            let mut known_ports: HashSet<String> = HashSet::new();
            loop {
                thread::sleep(Duration::from_millis(WATCHER_POLL_MS));
                if link.state() != LinkState::Searching {
                    // Keep tracking the enumeration so a later detach/reattach
                    // of the same port name is still seen as "new".
                    known_ports = link.port_source.list().into_iter().collect();
                    continue;
                }
                let current: HashSet<String> = link.port_source.list().into_iter().collect();
                let newly_appeared: Vec<&String> = current.difference(&known_ports).collect();
                if let Some(port_name) = newly_appeared.into_iter().next() {
                    let port_name = port_name.clone();
                    match link.open(&port_name) {
                        Ok(()) => {
                            tracing::info!(port = %port_name, role = ?link.role, "device attached");
                        }
                        Err(e) => {
                            tracing::debug!(port = %port_name, role = ?link.role, error = %e, "attach attempt did not classify as expected role");
                        }
                    }
                }
                known_ports = current;
            }
        })
    }

    /// Open `port_name` and run the identity handshake; on success the link
    /// transitions to `Ready`. On any mismatch or I/O error the link stays
    /// (or returns to) `Searching`. Exposed directly (not only through the
    /// watcher) — a caller that already knows the port name need not wait
    /// for the watcher to discover it.
    pub fn open(&self, port_name: &str) -> Result<(), AtmError> {
        let mut transport = self
            .port_source
            .open(port_name)
            .map_err(|_| AtmError::DeviceRemoved)?;

        transport
            .write_all(&[opcodes::PSOC_DEVICE_REQUEST])
            .map_err(|_| AtmError::DeviceRemoved)?;
        let mut reply = [0u8; 1];
        transport
            .read_exact(&mut reply)
            .map_err(|_| AtmError::DeviceRemoved)?;

        let matches_role = match self.role {
            DeviceRole::Hsm => reply[0] == opcodes::SYNC_TYPE_HSM_N || reply[0] == opcodes::SYNC_TYPE_HSM_P,
            DeviceRole::Card => reply[0] == opcodes::SYNC_TYPE_CARD_N || reply[0] == opcodes::SYNC_TYPE_CARD_P,
        };
        if !matches_role {
            return Err(AtmError::UnexpectedTag(reply[0]));
        }

        let mut inner = self.inner.lock().expect("link mutex poisoned");
        inner.transport = Some(transport);
        inner.state = LinkState::Ready;
        Ok(())
    }

    /// Run one sync round for `mode`. On success the peripheral
    /// has been sent `SYNCED` and is ready for the operation's own request.
    pub fn sync(&self, mode: SyncMode) -> Result<(), AtmError> {
        let query_byte = match mode {
            SyncMode::Normal => opcodes::SYNC_REQUEST_NO_PROV,
            SyncMode::Provision => opcodes::SYNC_REQUEST_PROV,
        };
        {
            let mut inner = self.inner.lock().expect("link mutex poisoned");
            inner.state = LinkState::Syncing;
        }
        self.write(&[query_byte])?;
        let reply = self.read(1)?;

        let outcome = match (mode, reply[0]) {
            (SyncMode::Normal, b) if b == opcodes::SYNC_CONFIRMED_PROV => Ok(()),
            (SyncMode::Normal, b) if b == opcodes::SYNC_CONFIRMED_NO_PROV => {
                Err(AtmError::NotProvisioned)
            }
            (SyncMode::Provision, b) if b == opcodes::SYNC_CONFIRMED_NO_PROV => Ok(()),
            (SyncMode::Provision, b) if b == opcodes::SYNC_CONFIRMED_PROV => {
                Err(AtmError::AlreadyProvisioned)
            }
            (_, b) => Err(AtmError::UnexpectedTag(b)),
        };

        if outcome.is_ok() {
            self.write(&[opcodes::SYNCED])?;
        }
        outcome
    }

    /// Write `buf` to the peripheral, observing the post-write quiet period.
    pub fn write(&self, buf: &[u8]) -> Result<(), AtmError> {
        self.with_transport(|transport| transport.write_all(buf))?;
        thread::sleep(Duration::from_millis(POST_WRITE_QUIET_MS));
        Ok(())
    }

    /// Read exactly `n` bytes from the peripheral.
    pub fn read(&self, n: usize) -> Result<Vec<u8>, AtmError> {
        let mut buf = vec![0u8; n];
        self.with_transport(|transport| transport.read_exact(&mut buf))?;
        Ok(buf)
    }

    /// Write a request and read back a fixed-length reply, the shape every
    /// CardProxy/HsmProxy operation follows.
    pub fn request_reply(&self, request: &[u8], reply_len: usize) -> Result<Vec<u8>, AtmError> {
        self.write(request)?;
        self.read(reply_len)
    }

    fn with_transport<F>(&self, f: F) -> Result<(), AtmError>
    where
        F: FnOnce(&mut Box<dyn SerialTransport>) -> std::io::Result<()>,
    {
        let mut inner = self.inner.lock().expect("link mutex poisoned");
        if inner.transport.is_none() {
            return Err(AtmError::DeviceRemoved);
        }
        inner.state = LinkState::InFlight;
        let result = f(inner.transport.as_mut().expect("checked above"));
        match result {
            Ok(()) => {
                inner.state = LinkState::Ready;
                Ok(())
            }
            Err(_) => {
                inner.transport = None;
                inner.state = LinkState::Searching;
                Err(AtmError::DeviceRemoved)
            }
        }
    }
}
