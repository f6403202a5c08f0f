//! Connection state and lifecycle events
//!
//! # Connection States
//!
//! - **Idle**: no address has been set yet
//! - **Connecting**: a socket is being opened
//! - **Unverified**: the socket is open and the handshake was sent, but the
//!   server hasn't acknowledged it; inbound data is dropped
//! - **Verified**: handshake acknowledged; data is delivered and commands are
//!   sent
//! - **Disconnected**: the socket closed or failed; either waiting for a
//!   retry or suspended while the app is in the background
//!
//! # State Transitions
//!
//! ```text
//! Idle → Connecting → Unverified → Verified
//!            ↑  ↓          ↓           ↓
//!            Disconnected ←────────────┘
//! ```
//!
//! The current state is published on a watch channel, and every transition
//! that screens care about (connecting, verified, disconnected) is also
//! broadcast as a [`ConnectionEvent`] so any number of consumers can follow
//! the lifecycle, e.g. to grey out controls while offline.

use crate::metrics::ClientMetrics;
use arenalink_core::Error;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 64;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Unverified,
    Verified,
    Disconnected,
}

impl ConnectionState {
    /// Handshake completed on the current socket
    pub fn is_verified(&self) -> bool {
        matches!(self, ConnectionState::Verified)
    }

    /// A socket is open, verified or not
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Unverified | ConnectionState::Verified)
    }

    /// Gauge value (0=idle, 1=connecting, 2=unverified, 3=verified, 4=disconnected)
    pub(crate) fn metric_code(&self) -> i64 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Unverified => 2,
            ConnectionState::Verified => 3,
            ConnectionState::Disconnected => 4,
        }
    }
}

/// Connection lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A socket is being opened to this address
    Connecting { address: String },
    /// The server acknowledged the handshake
    Verified,
    /// The socket is gone; `error` is `None` for a clean close
    Disconnected { error: Option<Error> },
}

/// Publishes state and lifecycle events
///
/// Written only by the session task; read by any number of handles.
pub(crate) struct StateTracker {
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl StateTracker {
    pub(crate) fn new(metrics: Option<Arc<ClientMetrics>>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            events,
            metrics,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Move to `new_state` and optionally announce `event`
    pub(crate) fn transition(&self, new_state: ConnectionState, event: Option<ConnectionEvent>) {
        let previous = self.state.send_replace(new_state);
        if previous != new_state {
            tracing::debug!(from = ?previous, to = ?new_state, "Connection state changed");
        }

        if let Some(ref m) = self.metrics {
            m.update_connection_state(new_state.metric_code());
        }

        if let Some(event) = event {
            // No receivers is fine; nobody is watching the lifecycle
            let _ = self.events.send(event);
        }
    }
}
