//! Transport seam between the core and the device management API.

use thiserror::Error;

use crate::store::RawRecord;

/// Request parameters: query arguments for `print`, JSON body for commands.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Errors raised by a transport.
///
/// Every variant is retryable and drives the connection backoff counter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, TLS handshake failure.
    #[error("connect error: {0}")]
    Connect(String),

    /// Socket timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Device answered with a non-success HTTP status.
    #[error("device returned status {0}")]
    Status(u16),

    /// Response body could not be decoded into records.
    #[error("decode error: {0}")]
    Decode(String),

    /// Any other request failure.
    #[error("request error: {0}")]
    Request(String),
}

/// Operation performed on an API path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// List the items under the path.
    Print,
    /// Run a named command on the path (e.g. `monitor`).
    Command(String),
}

impl Verb {
    /// Shorthand for [`Verb::Command`].
    pub fn command(name: impl Into<String>) -> Self {
        Self::Command(name.into())
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Print => f.write_str("print"),
            Self::Command(cmd) => f.write_str(cmd),
        }
    }
}

/// Request/response access to one device.
///
/// Implementations perform the network round-trip only; connection state and
/// backoff live in [`DeviceConnection`](super::DeviceConnection).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish (or validate) a session with the device.
    async fn handshake(&self) -> Result<(), TransportError>;

    /// Execute `verb` on `path` and return the resulting records.
    async fn call(
        &self,
        path: &str,
        verb: &Verb,
        params: &Params,
    ) -> Result<Vec<RawRecord>, TransportError>;
}
