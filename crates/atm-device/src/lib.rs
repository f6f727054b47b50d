pub mod link;
pub mod transport;

pub use link::{DeviceLink, DeviceRole, LinkState, SyncMode};
pub use transport::{FakeSerial, PortSource, RealPortSource, RealSerial, SerialTransport};
