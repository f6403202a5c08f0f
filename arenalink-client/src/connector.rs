//! Socket factory abstraction
//!
//! The connection manager never talks to `tokio-tungstenite` directly. It asks
//! a [`Connector`] for a fresh [`Socket`] every time it (re)connects, which
//! keeps the session logic testable with in-memory sockets.
//!
//! A socket is a pair of a frame sink and a frame stream. Only the frames the
//! protocol cares about are modelled; pings and pongs are handled inside the
//! WebSocket library.

use arenalink_core::{Error, Result};
use async_trait::async_trait;
use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// A WebSocket frame as seen by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame, the only kind carrying protocol messages
    Text(String),
    /// Binary frame, ignored by the session
    Binary(Vec<u8>),
    /// Close handshake
    Close,
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
            Frame::Close => Message::Close(None),
        }
    }
}

/// Outbound half of a socket
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = Error> + Send>>;

/// Inbound half of a socket
///
/// The stream ends when the connection is gone. An `Err` item is a transport
/// failure.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// An open socket
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Socket {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Socket factory used by the connection manager
///
/// `open` resolves once the socket is open (or failed to open). A failed
/// open is treated like a socket error: the manager waits the backoff delay
/// before trying again.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, address: &str) -> Result<Socket>;
}

/// Connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, address: &str) -> Result<Socket> {
        let (ws_stream, _) = connect_async(address)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let (sink, stream) = ws_stream.split();

        let sink = sink
            .sink_map_err(|e| Error::WebSocket(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<Message, Error>(frame.into())));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                Ok(_) => None,
                Err(e) => Some(Err(Error::WebSocket(e.to_string()))),
            })
        });

        Ok(Socket::new(Box::pin(sink), Box::pin(stream)))
    }
}
