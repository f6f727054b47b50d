//! Byte transports and port sources behind `DeviceLink`.
//!
//! A capability trait backed by two implementations: real serial hardware
//! and a scripted in-memory fake for tests. `SerialTransport` and
//! `PortSource` are that seam.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use atm_core::constants::{SERIAL_BAUD_RATE, SERIAL_READ_TIMEOUT_MS};

/// One opened byte channel to a peripheral.
///
/// `DeviceLink` only ever calls `write_all`/`read_exact`; it never needs to
/// know whether the bytes crossed a USB-CDC link or a test harness's queue.
pub trait SerialTransport: Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

/// A real USB-CDC serial port, opened at 115200 8N1.
pub struct RealSerial {
    port: Box<dyn serialport::SerialPort>,
}

impl RealSerial {
    pub fn open(port_name: &str) -> io::Result<Self> {
        let port = serialport::new(port_name, SERIAL_BAUD_RATE)
            .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
            .open()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(Self { port })
    }
}

impl SerialTransport for RealSerial {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.port.write_all(buf)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        use std::io::Read;
        self.port.read_exact(buf)
    }
}

/// A scripted, in-memory transport for unit and integration tests.
///
/// Tests push bytes into `inbound` (what the fake peripheral would have
/// sent) and inspect `outbound` (what the code under test wrote) after the
/// exchange.
#[derive(Default)]
pub struct FakeSerial {
    inbound: VecDeque<u8>,
    pub outbound: Vec<u8>,
    /// When set, the next read/write fails with this error instead of
    /// touching the queues, simulating a peripheral disconnect mid-call.
    pub fail_next: Option<io::ErrorKind>,
}

impl FakeSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be returned by future `read_exact` calls.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

impl SerialTransport for FakeSerial {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if let Some(kind) = self.fail_next.take() {
            return Err(io::Error::new(kind, "fake serial: simulated failure"));
        }
        self.outbound.extend_from_slice(buf);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if let Some(kind) = self.fail_next.take() {
            return Err(io::Error::new(kind, "fake serial: simulated failure"));
        }
        if self.inbound.len() < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "fake serial: not enough queued bytes",
            ));
        }
        for slot in buf.iter_mut() {
            *slot = self.inbound.pop_front().expect("checked length above");
        }
        Ok(())
    }
}

/// Source of port enumeration and opening, abstracted so the attach/detach
/// watcher can be driven by a test harness instead of real hardware.
pub trait PortSource: Send + Sync {
    /// Names of every serial port currently visible to the OS.
    fn list(&self) -> Vec<String>;

    /// Open a named port as a live transport.
    fn open(&self, port_name: &str) -> io::Result<Box<dyn SerialTransport>>;
}

/// Enumerates and opens real USB-CDC ports via the `serialport` crate.
pub struct RealPortSource;

impl PortSource for RealPortSource {
    fn list(&self) -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }

    fn open(&self, port_name: &str) -> io::Result<Box<dyn SerialTransport>> {
        Ok(Box::new(RealSerial::open(port_name)?))
    }
}
