//! Connection manager
//!
//! [`ConnectionManager`] owns at most one live socket to one address. All
//! connection state lives in a single session task; the manager handle is a
//! cheap clone that sends control messages to it, so there is no shared
//! mutable connection state and no locking.
//!
//! # Session Lifecycle
//!
//! 1. **Connect**: `connect(address)` opens a socket through the
//!    [`Connector`] and sends the `init` handshake as soon as it opens
//! 2. **Verify**: the server's `init` reply marks the session verified;
//!    only now are data frames delivered and commands sent
//! 3. **Reconnect**: a clean close reconnects immediately, an error waits for
//!    the [`ReconnectionStrategy`] delay; the last address is reused
//! 4. **Suspend**: `enter_background()` closes the socket and stops retrying;
//!    `enter_foreground()` opens a new one if an address is set
//!
//! Verified data frames and lifecycle changes are forwarded to the topic
//! dispatcher through one ordered channel, so subscribers see frames in the
//! order they arrived on the socket.

use crate::connection_state::{ConnectionEvent, ConnectionState, StateTracker};
use crate::connector::{Connector, Frame, Socket};
use crate::metrics::ClientMetrics;
use crate::reconnect::ReconnectionStrategy;
use arenalink_core::{codec, Command, Envelope, Error, Handshake, Result};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Sleep;

/// Upper bound on sending the close frame during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Identity announced in the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub device_id: String,
    pub socket_type: String,
}

impl Identity {
    pub fn new(device_id: impl Into<String>, socket_type: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            socket_type: socket_type.into(),
        }
    }
}

/// What the session forwards to the dispatcher, in socket order
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The handshake completed on a new socket
    Verified,
    /// The current socket is gone
    Disconnected,
    /// A decoded data frame received while verified
    Message(Envelope),
}

#[derive(Debug)]
enum Control {
    Connect(String),
    Send { text: String, guarded: bool },
    Background,
    Foreground,
    Shutdown,
}

/// Handle to the session task
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    controls: mpsc::UnboundedSender<Control>,
    tracker: Arc<StateTracker>,
}

impl ConnectionManager {
    /// Spawn a session task
    ///
    /// Returns the handle and the ordered inbound channel meant for the
    /// dispatcher. Must be called inside a tokio runtime. The task runs until
    /// [`shutdown`](Self::shutdown) is called or every handle is dropped.
    pub fn spawn(
        identity: Identity,
        connector: Arc<dyn Connector>,
        strategy: Box<dyn ReconnectionStrategy>,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (controls_tx, controls_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(StateTracker::new(metrics.clone()));

        let task = SessionTask {
            identity,
            connector,
            strategy,
            metrics,
            tracker: Arc::clone(&tracker),
            controls: controls_rx,
            inbound: inbound_tx,
            address: None,
            socket: None,
            opening: None,
            retry: None,
            backgrounded: false,
            attempt: 0,
            opened_before: false,
        };
        tokio::spawn(task.run());

        (
            Self {
                controls: controls_tx,
                tracker,
            },
            inbound_rx,
        )
    }

    /// Connect to `address`, replacing any socket to a different address
    ///
    /// A no-op when a socket to the same address is already open or opening.
    pub fn connect(&self, address: impl Into<String>) -> Result<()> {
        self.control(Control::Connect(address.into()))
    }

    /// Send a command once the handshake has completed
    ///
    /// Silently dropped while the session isn't verified, so commands are
    /// never written before the server is ready to accept them.
    pub fn send_command(&self, command: impl Into<Command>) -> Result<()> {
        let text = codec::encode(&command.into())?;
        self.control(Control::Send {
            text,
            guarded: true,
        })
    }

    /// Serialize and write any message without the handshake guard
    ///
    /// The message is dropped only if no socket is open. Serialization
    /// failures are returned; write failures are logged and not retried.
    pub fn send_json<T: Serialize>(&self, message: &T) -> Result<()> {
        let text = codec::encode(message)?;
        self.control(Control::Send {
            text,
            guarded: false,
        })
    }

    /// The app moved to the background: close the socket, keep the address
    pub fn enter_background(&self) -> Result<()> {
        self.control(Control::Background)
    }

    /// The app came back: reopen the socket if an address is set
    pub fn enter_foreground(&self) -> Result<()> {
        self.control(Control::Foreground)
    }

    /// Close the socket and stop the session task
    pub fn shutdown(&self) -> Result<()> {
        self.control(Control::Shutdown)
    }

    /// Wait until the session task has stopped
    pub async fn closed(&self) {
        self.controls.closed().await
    }

    pub fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    pub fn is_verified(&self) -> bool {
        self.state().is_verified()
    }

    /// Watch the connection state
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.tracker.watch()
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> Result<ConnectionState> {
        let mut watch = self.tracker.watch();
        let state = watch
            .wait_for(predicate)
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(*state)
    }

    /// Follow connection lifecycle events from now on
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tracker.events()
    }

    fn control(&self, control: Control) -> Result<()> {
        self.controls
            .send(control)
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// The single owner of all connection state
struct SessionTask {
    identity: Identity,
    connector: Arc<dyn Connector>,
    strategy: Box<dyn ReconnectionStrategy>,
    metrics: Option<Arc<ClientMetrics>>,
    tracker: Arc<StateTracker>,
    controls: mpsc::UnboundedReceiver<Control>,
    inbound: mpsc::UnboundedSender<Inbound>,
    address: Option<String>,
    socket: Option<Socket>,
    opening: Option<BoxFuture<'static, Result<Socket>>>,
    retry: Option<Pin<Box<Sleep>>>,
    backgrounded: bool,
    /// Consecutive failures since the last completed handshake
    attempt: u32,
    opened_before: bool,
}

impl SessionTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                control = self.controls.recv() => match control {
                    Some(Control::Shutdown) | None => break,
                    Some(control) => self.handle_control(control).await,
                },
                opened = poll_opening(&mut self.opening) => self.on_opened(opened).await,
                frame = next_frame(&mut self.socket) => self.on_frame(frame).await,
                () = wait_retry(&mut self.retry) => {
                    self.retry = None;
                    self.open();
                }
            }
        }

        tracing::info!("Session stopped");
        self.teardown().await;
    }

    async fn handle_control(&mut self, control: Control) {
        match control {
            Control::Connect(address) => self.connect(address).await,
            Control::Send { text, guarded } => self.write(text, guarded).await,
            Control::Background => {
                tracing::info!("Entering background, suspending connection");
                self.backgrounded = true;
                self.teardown().await;
            }
            Control::Foreground => {
                tracing::info!("Entering foreground");
                self.backgrounded = false;
                if self.socket.is_none() && self.opening.is_none() {
                    self.open();
                }
            }
            Control::Shutdown => {}
        }
    }

    async fn connect(&mut self, address: String) {
        let unchanged = self.address.as_deref() == Some(address.as_str());
        if unchanged && (self.socket.is_some() || self.opening.is_some()) {
            tracing::debug!(address = %address, "Already connected to address");
            return;
        }

        self.address = Some(address);
        if self.backgrounded {
            tracing::debug!("Backgrounded, deferring connect until foreground");
            return;
        }

        self.teardown().await;
        self.open();
    }

    /// Close the socket, if any, and cancel pending opens and retries
    async fn teardown(&mut self) {
        self.opening = None;
        self.retry = None;

        if let Some(mut socket) = self.socket.take() {
            // A peer that stopped reading must not stall the session
            let close = async {
                let _ = socket.sink.send(Frame::Close).await;
                let _ = socket.sink.close().await;
            };
            if tokio::time::timeout(CLOSE_TIMEOUT, close).await.is_err() {
                tracing::warn!("Timed out closing socket, dropping it");
            }
            self.tracker.transition(
                ConnectionState::Disconnected,
                Some(ConnectionEvent::Disconnected { error: None }),
            );
            self.forward(Inbound::Disconnected);
        } else if self.tracker.state() == ConnectionState::Connecting {
            self.tracker.transition(ConnectionState::Disconnected, None);
        }
    }

    /// Start opening a socket to the current address
    fn open(&mut self) {
        let Some(address) = self.address.clone() else {
            return;
        };
        self.retry = None;

        tracing::info!(address = %address, attempt = self.attempt, "Connecting");
        if self.opened_before {
            if let Some(ref m) = self.metrics {
                m.record_reconnection_attempt();
            }
        }
        self.opened_before = true;

        self.tracker.transition(
            ConnectionState::Connecting,
            Some(ConnectionEvent::Connecting {
                address: address.clone(),
            }),
        );

        let connector = Arc::clone(&self.connector);
        self.opening = Some(Box::pin(async move { connector.open(&address).await }));
    }

    async fn on_opened(&mut self, opened: Result<Socket>) {
        match opened {
            Ok(socket) => {
                tracing::info!("Socket open, sending handshake");
                self.socket = Some(socket);
                self.tracker.transition(ConnectionState::Unverified, None);

                let handshake = Handshake::new(
                    self.identity.device_id.clone(),
                    self.identity.socket_type.clone(),
                );
                match codec::encode(&handshake) {
                    Ok(text) => self.write(text, false).await,
                    Err(e) => tracing::error!(error = %e, "Failed to encode handshake"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open socket");
                self.on_disconnected(Some(e));
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<Frame>>) {
        match frame {
            Some(Ok(Frame::Text(text))) => self.on_text(&text),
            Some(Ok(Frame::Binary(_))) => {
                tracing::trace!("Ignoring binary frame");
            }
            Some(Ok(Frame::Close)) => {
                tracing::info!("Connection closed by server");
                self.socket = None;
                self.on_disconnected(None);
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "WebSocket error");
                self.socket = None;
                self.on_disconnected(Some(e));
            }
            None => {
                tracing::warn!("Socket ended without close frame");
                self.socket = None;
                self.on_disconnected(Some(Error::ConnectionClosed));
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        tracing::trace!(frame = %text, "Frame received");
        if let Some(ref m) = self.metrics {
            m.record_frame();
        }

        let envelope = match codec::decode_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed frame");
                self.record_dropped(e.kind());
                return;
            }
        };

        if envelope.is_handshake() && self.tracker.state().is_verified() {
            tracing::debug!("Ignoring repeated handshake reply");
            self.record_dropped("duplicate_init");
        } else if envelope.is_handshake() {
            tracing::info!("Handshake acknowledged");
            self.attempt = 0;
            self.strategy.reset();
            if let Some(ref m) = self.metrics {
                m.record_handshake();
            }
            self.tracker
                .transition(ConnectionState::Verified, Some(ConnectionEvent::Verified));
            self.forward(Inbound::Verified);
        } else if self.tracker.state().is_verified() {
            self.forward(Inbound::Message(envelope));
        } else {
            tracing::debug!(cmd = %envelope.cmd, "Dropping frame received before handshake");
            self.record_dropped("unverified");
        }
    }

    /// The socket (or the attempt to open one) is gone
    fn on_disconnected(&mut self, error: Option<Error>) {
        if let Some(ref e) = error {
            if let Some(ref m) = self.metrics {
                m.record_error(e.kind());
            }
        }

        let was_open = self.tracker.state().is_open();
        self.tracker.transition(
            ConnectionState::Disconnected,
            Some(ConnectionEvent::Disconnected {
                error: error.clone(),
            }),
        );
        if was_open {
            self.forward(Inbound::Disconnected);
        }

        if self.backgrounded {
            tracing::debug!("Backgrounded, not reconnecting");
            return;
        }
        if self.address.is_none() {
            return;
        }

        if error.is_none() {
            self.open();
            return;
        }

        match self.strategy.next_delay(self.attempt) {
            Some(delay) => {
                self.attempt = self.attempt.saturating_add(1);
                tracing::info!(
                    delay_secs = delay.as_secs_f64(),
                    attempt = self.attempt,
                    "Reconnecting after delay"
                );
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            None => {
                tracing::error!("Reconnection abandoned (max attempts reached)");
            }
        }
    }

    async fn write(&mut self, text: String, guarded: bool) {
        if guarded && !self.tracker.state().is_verified() {
            tracing::debug!(frame = %text, "Not verified, dropping command");
            return;
        }
        let Some(socket) = self.socket.as_mut() else {
            tracing::debug!(frame = %text, "No socket, dropping message");
            return;
        };

        tracing::debug!(frame = %text, "Sending");
        match socket.sink.send(Frame::Text(text)).await {
            Ok(()) => {
                if let Some(ref m) = self.metrics {
                    m.record_command();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write message");
                if let Some(ref m) = self.metrics {
                    m.record_error("write");
                }
            }
        }
    }

    fn forward(&self, inbound: Inbound) {
        // The dispatcher only goes away at shutdown
        let _ = self.inbound.send(inbound);
    }

    fn record_dropped(&self, reason: &str) {
        if let Some(ref m) = self.metrics {
            m.record_dropped(reason);
        }
    }
}

async fn poll_opening(opening: &mut Option<BoxFuture<'static, Result<Socket>>>) -> Result<Socket> {
    match opening {
        Some(future) => {
            let result = future.await;
            *opening = None;
            result
        }
        None => pending().await,
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<Frame>> {
    match socket {
        Some(socket) => socket.stream.next().await,
        None => pending().await,
    }
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::FixedDelay;
    use async_trait::async_trait;
    use futures::channel::mpsc as chan;
    use std::time::Duration;

    /// Connector whose sockets are in-memory channels handed to the test
    struct ChannelConnector {
        sockets: mpsc::UnboundedSender<(chan::UnboundedSender<Result<Frame>>, chan::UnboundedReceiver<Frame>)>,
    }

    #[async_trait]
    impl Connector for ChannelConnector {
        async fn open(&self, _address: &str) -> Result<Socket> {
            let (to_client, from_server) = chan::unbounded();
            let (to_server, from_client) = chan::unbounded();
            let _ = self.sockets.send((to_client, from_client));
            Ok(Socket::new(
                Box::pin(to_server.sink_map_err(|e| Error::WebSocket(e.to_string()))),
                Box::pin(from_server),
            ))
        }
    }

    #[tokio::test]
    async fn test_handshake_sent_on_open() {
        let (sockets_tx, mut sockets_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(ChannelConnector { sockets: sockets_tx });
        let (manager, _inbound) = ConnectionManager::spawn(
            Identity::new("admin", "1"),
            connector,
            Box::new(FixedDelay::new(Duration::from_millis(10))),
            None,
        );

        assert_eq!(manager.state(), ConnectionState::Idle);
        manager.connect("ws://hall/ws").unwrap();

        let (_to_client, mut from_client) = sockets_rx.recv().await.unwrap();
        let handshake = from_client.next().await.unwrap();
        assert_eq!(
            handshake,
            Frame::Text(r#"{"cmd":"init","ID":"admin","TYPE":"1"}"#.to_string())
        );
        assert_eq!(manager.state(), ConnectionState::Unverified);

        manager.shutdown().unwrap();
    }

    /// Connector whose sink accepts the handshake and then never completes a write
    struct StalledConnector;

    #[async_trait]
    impl Connector for StalledConnector {
        async fn open(&self, _address: &str) -> Result<Socket> {
            let sink = futures::sink::unfold(0usize, |sent, _frame: Frame| async move {
                if sent == 0 {
                    Ok(sent + 1)
                } else {
                    std::future::pending::<Result<usize>>().await
                }
            });
            Ok(Socket::new(Box::pin(sink), Box::pin(futures::stream::pending())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_with_stalled_close() {
        let (manager, _inbound) = ConnectionManager::spawn(
            Identity::new("admin", "1"),
            Arc::new(StalledConnector),
            Box::new(FixedDelay::default()),
            None,
        );

        manager.connect("ws://hall/ws").unwrap();
        manager
            .wait_for_state(|s| *s == ConnectionState::Unverified)
            .await
            .unwrap();

        manager.shutdown().unwrap();
        tokio::time::timeout(Duration::from_secs(10), manager.closed())
            .await
            .expect("session task stuck closing the socket");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let (sockets_tx, _sockets_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(ChannelConnector { sockets: sockets_tx });
        let (manager, mut inbound) = ConnectionManager::spawn(
            Identity::new("admin", "1"),
            connector,
            Box::new(FixedDelay::default()),
            None,
        );

        manager.shutdown().unwrap();
        // The inbound channel closes once the task has exited
        assert!(inbound.recv().await.is_none());
        assert_eq!(manager.connect("ws://hall/ws"), Err(Error::ConnectionClosed));
        assert_eq!(manager.send_command("queryHallData"), Err(Error::ConnectionClosed));
    }
}
