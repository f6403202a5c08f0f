//! Common test utilities for arenalink-client integration tests
//!
//! Two ways to stand in for the attraction server:
//!
//! - [`MockConnector`]: in-memory sockets, one [`ServerSide`] handed to the
//!   test per opened socket; works with a paused clock
//! - [`MockWsServer`]: a real `tokio-tungstenite` server on localhost

#![allow(dead_code)]

use arenalink_client::{ArenaClient, ClientBuilder, ClientConfig, Connector, Frame, Socket};
use arenalink_core::{Error, Result};
use async_trait::async_trait;
use futures::channel::mpsc as chan;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const HOST: &str = "hall:3000";
pub const ADDRESS: &str = "ws://hall:3000/ws";

const WAIT: Duration = Duration::from_secs(5);

/// Server end of one in-memory socket
pub struct ServerSide {
    pub address: String,
    to_client: chan::UnboundedSender<Result<Frame>>,
    from_client: chan::UnboundedReceiver<Frame>,
}

impl ServerSide {
    /// Next frame written by the client; `None` once the client dropped the socket
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(WAIT, self.from_client.next())
            .await
            .ok()
            .flatten()
    }

    /// Next text frame written by the client, parsed as JSON
    pub async fn next_json(&mut self) -> Option<Value> {
        loop {
            match self.next_frame().await? {
                Frame::Text(text) => return serde_json::from_str(&text).ok(),
                _ => continue,
            }
        }
    }

    /// Read until a frame with this `cmd` arrives, returning the ones before it
    pub async fn read_until(&mut self, cmd: &str) -> Vec<Value> {
        let mut before = Vec::new();
        while let Some(frame) = self.next_json().await {
            if frame["cmd"] == cmd {
                return before;
            }
            before.push(frame);
        }
        panic!("connection ended before {:?}; got {:?}", cmd, before);
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.unbounded_send(Ok(Frame::Text(text.into())));
    }

    pub fn send(&self, message: Value) {
        self.send_text(message.to_string());
    }

    pub fn send_frame(&self, frame: Frame) {
        let _ = self.to_client.unbounded_send(Ok(frame));
    }

    /// Close the socket cleanly
    pub fn close(&self) {
        self.send_frame(Frame::Close);
    }

    /// Break the socket with a transport error
    pub fn fail(&self) {
        let _ = self
            .to_client
            .unbounded_send(Err(Error::WebSocket("connection reset".to_string())));
    }

    /// Expect the handshake and acknowledge it
    pub async fn accept_handshake(&mut self) -> Value {
        let handshake = self.next_json().await.expect("no handshake");
        assert_eq!(handshake["cmd"], "init");
        self.send(json!({"cmd": "init", "data": {}}));
        handshake
    }
}

/// Connector handing every opened socket to the test
pub struct MockConnector {
    sockets: mpsc::UnboundedSender<ServerSide>,
    failures: AtomicUsize,
    opens: Mutex<Vec<(String, Instant)>>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
        let (sockets, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            sockets,
            failures: AtomicUsize::new(0),
            opens: Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    /// Make the next `count` opens fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Every open attempt so far, with its address and time
    pub fn opens(&self) -> Vec<(String, Instant)> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, address: &str) -> Result<Socket> {
        self.opens
            .lock()
            .unwrap()
            .push((address.to_string(), Instant::now()));

        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::WebSocket("connection refused".to_string()));
        }

        let (to_client, from_server) = chan::unbounded();
        let (to_server, from_client) = chan::unbounded();
        let _ = self.sockets.send(ServerSide {
            address: address.to_string(),
            to_client,
            from_client,
        });

        Ok(Socket::new(
            Box::pin(to_server.sink_map_err(|e| Error::WebSocket(e.to_string()))),
            Box::pin(from_server),
        ))
    }
}

/// A client for [`HOST`] built on a mock connector
pub fn mock_client(connector: Arc<MockConnector>) -> ArenaClient {
    ClientBuilder::new(ClientConfig::new(HOST))
        .with_connector(connector)
        .build()
        .unwrap()
}

/// Connect and complete the handshake, returning the server side
pub async fn verified(
    client: &ArenaClient,
    sockets: &mut mpsc::UnboundedReceiver<ServerSide>,
) -> ServerSide {
    client.connect().unwrap();
    let mut server = next_socket(sockets).await;
    server.accept_handshake().await;
    server
}

pub async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<ServerSide>) -> ServerSide {
    tokio::time::timeout(Duration::from_secs(60), sockets.recv())
        .await
        .expect("no socket opened")
        .expect("connector dropped")
}

/// Receive one delivery or fail
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("channel closed")
}

/// Mock WebSocket server for end-to-end tests
///
/// Replies to every text frame with whatever the handler returns and
/// reports every received frame to the test.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::Receiver<String>,
}

impl MockWsServer {
    /// Start a server that acknowledges the handshake and nothing else
    pub async fn new() -> Self {
        Self::with_handler(|msg| {
            if msg["cmd"] == "init" {
                vec![json!({"cmd": "init", "data": {}})]
            } else {
                Vec::new()
            }
        })
        .await
    }

    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, msg_rx) = mpsc::channel::<String>(100);
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let msg_tx = msg_tx.clone();
                        let handler = Arc::clone(&handler);

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();

                            while let Some(Ok(msg)) = read.next().await {
                                let Message::Text(text) = msg else { continue };
                                let _ = msg_tx.send(text.clone()).await;

                                let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
                                for reply in handler(&value) {
                                    let _ = write.send(Message::Text(reply.to_string())).await;
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            message_rx: msg_rx,
        }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Next text frame the server received, parsed as JSON
    pub async fn wait_for_message(&mut self) -> Option<Value> {
        let text = tokio::time::timeout(WAIT, self.message_rx.recv())
            .await
            .ok()
            .flatten()?;
        serde_json::from_str(&text).ok()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
