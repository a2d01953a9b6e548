//! Device connection state machine.
//!
//! One [`DeviceConnection`] exists per device for the life of the process.
//! It is created disconnected, becomes connected after a successful handshake
//! and drops back to disconnected on any transport error. Reconnection is
//! paced by [`BackoffPolicy`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use super::transport::{Params, Transport, TransportError, Verb};
use crate::store::RawRecord;

/// Errors returned by [`DeviceConnection::call`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The connection is down; no request was made.
    #[error("device is not connected")]
    NotConnected,

    /// The request failed; the connection has been marked down.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Linear reconnect backoff.
///
/// `delay = min(max_delay, initial_delay * (1 + failures / inc_div))`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    inc_div: u32,
    max_delay: Duration,
}

impl BackoffPolicy {
    /// Create a policy. An `inc_div` of zero is treated as one.
    pub fn new(initial_delay: Duration, inc_div: u32, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            inc_div: inc_div.max(1),
            max_delay,
        }
    }

    /// Delay enforced after `failures` successive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        // initial * (1 + n/d) == initial * (d + n) / d, in integer nanoseconds
        let div = u128::from(self.inc_div);
        let nanos = self.initial_delay.as_nanos() * (div + u128::from(failures)) / div;
        if nanos >= self.max_delay.as_nanos() {
            return self.max_delay;
        }
        u64::try_from(nanos).map_or(self.max_delay, Duration::from_nanos)
    }
}

/// Mutable connection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// Last handshake succeeded and no call has failed since.
    pub connected: bool,
    /// Time of the most recent failure; `None` after a successful connect.
    pub last_failure: Option<DateTime<Utc>>,
    /// Failures since the last successful connect.
    pub successive_failure_count: u32,
}

/// Result of a [`DeviceConnection::connect`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttempt {
    /// Nothing to do.
    AlreadyConnected,
    /// Still inside the backoff window; no attempt was made.
    Suppressed {
        /// Time left until an attempt is permitted.
        remaining: Duration,
    },
    /// Handshake succeeded.
    Connected,
    /// Handshake failed; the failure has been recorded.
    Failed,
}

/// Connection to one device.
pub struct DeviceConnection {
    device: String,
    address: String,
    transport: Box<dyn Transport>,
    backoff: BackoffPolicy,
    state: Mutex<ConnectionState>,
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("device", &self.device)
            .field("address", &self.address)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl DeviceConnection {
    /// Create a disconnected connection.
    pub fn new(
        device: impl Into<String>,
        address: impl Into<String>,
        transport: impl Transport,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            device: device.into(),
            address: address.into(),
            transport: Box::new(transport),
            backoff,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Last known connection flag. Performs no I/O.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Current backoff delay for the recorded failure count.
    pub fn current_delay(&self) -> Duration {
        self.backoff.delay(self.state.lock().successive_failure_count)
    }

    /// Connect unless already connected or inside the backoff window.
    ///
    /// Failures are logged and recorded, never returned; callers re-check
    /// [`is_connected`](Self::is_connected).
    pub async fn connect(&self) -> ConnectAttempt {
        self.connect_at(Utc::now()).await
    }

    pub(crate) async fn connect_at(&self, now: DateTime<Utc>) -> ConnectAttempt {
        if self.is_connected() {
            return ConnectAttempt::AlreadyConnected;
        }

        if let Some(remaining) = self.remaining_backoff(now) {
            tracing::debug!(
                device = %self.device,
                address = %self.address,
                remaining_secs = remaining.as_secs(),
                failures = self.state.lock().successive_failure_count,
                "In connect timeout"
            );
            return ConnectAttempt::Suppressed { remaining };
        }

        tracing::info!(device = %self.device, address = %self.address, "Connecting to device");
        match self.transport.handshake().await {
            Ok(()) => {
                self.mark_connected();
                ConnectAttempt::Connected
            }
            Err(e) => {
                self.mark_failed(now, &e);
                ConnectAttempt::Failed
            }
        }
    }

    /// Validate liveness with a cheap round-trip.
    ///
    /// Returns false without I/O when already disconnected. A transport error
    /// records a failure exactly like a failed connect.
    pub async fn check_connection(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.transport.handshake().await {
            Ok(()) => true,
            Err(e) => {
                self.mark_failed(Utc::now(), &e);
                false
            }
        }
    }

    /// Execute a request. Does not retry.
    ///
    /// # Errors
    /// `FetchError::NotConnected` when disconnected (no request made);
    /// `FetchError::Transport` when the request fails, after marking the
    /// connection down.
    pub async fn call(
        &self,
        path: &str,
        verb: &Verb,
        params: &Params,
    ) -> Result<Vec<RawRecord>, FetchError> {
        if !self.is_connected() {
            return Err(FetchError::NotConnected);
        }

        match self.transport.call(path, verb, params).await {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::error!(
                    device = %self.device,
                    path = %path,
                    verb = %verb,
                    error = %e,
                    "Error getting resource"
                );
                self.mark_failed(Utc::now(), &e);
                Err(FetchError::Transport(e))
            }
        }
    }

    /// `print` on `path` with no parameters.
    pub async fn get(&self, path: &str) -> Result<Vec<RawRecord>, FetchError> {
        self.call(path, &Verb::Print, &Params::new()).await
    }

    fn remaining_backoff(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = *self.state.lock();
        let last_failure = state.last_failure?;
        let delay = self.backoff.delay(state.successive_failure_count);
        let elapsed = (now - last_failure).to_std().unwrap_or(Duration::ZERO);
        (elapsed < delay).then(|| delay - elapsed)
    }

    fn mark_connected(&self) {
        *self.state.lock() = ConnectionState {
            connected: true,
            last_failure: None,
            successive_failure_count: 0,
        };
        tracing::info!(device = %self.device, address = %self.address, "Connection established");
    }

    fn mark_failed(&self, now: DateTime<Utc>, err: &TransportError) {
        let failures = {
            let mut state = self.state.lock();
            state.connected = false;
            state.successive_failure_count = state.successive_failure_count.saturating_add(1);
            state.last_failure = Some(now);
            state.successive_failure_count
        };
        tracing::error!(
            device = %self.device,
            address = %self.address,
            failures,
            error = %err,
            "Connection to device failed"
        );
    }
}
