//! Device Layer
//!
//! Everything needed to talk to one RouterOS device.
//!
//! # Architecture
//!
//! - [`Transport`]: request/response seam to the device management API
//! - [`RestTransport`]: RouterOS REST API over `reqwest`
//! - [`DeviceConnection`]: connection state machine with linear backoff
//! - [`DeviceEntry`]: identity + config + connection + assigned collectors

mod connection;
mod entry;
mod rest;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{BackoffPolicy, ConnectAttempt, ConnectionState, DeviceConnection, FetchError};
pub use entry::{DEVICE_LABELS, DeviceEntry, DeviceIdentity};
pub use rest::RestTransport;
pub use transport::{Params, Transport, TransportError, Verb};
