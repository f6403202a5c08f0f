//! Reconnecting WebSocket client for the arena control room
//!
//! This crate keeps one screen connected to the attraction server and routes
//! the server's messages to whoever is interested in them.
//!
//! # Core Features
//!
//! - **Session**: one socket per client with the `init` handshake; nothing is
//!   delivered or sent before the server acknowledges it
//! - **Auto-Reconnection**: clean closes reconnect at once, errors after a
//!   fixed delay (10 s by default), always to the last address
//! - **Background/Foreground**: suspend the socket while the app is hidden
//! - **Topics**: subscribe to server message categories; pull topics are
//!   queried on subscribe and after every reconnect
//! - **Observability**: OpenTelemetry metrics and `tracing` logs
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use arenalink_client::{ArenaClient, ClientConfig, Delivery};
//! use arenalink_core::Topic;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ArenaClient::builder(ClientConfig::from_env()).build()?;
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
//!     client.subscribe([Topic::HallData, Topic::UpdateMatch], tx).await;
//!     client.connect()?;
//!
//!     while let Some(delivery) = rx.recv().await {
//!         println!("{}: {}", delivery.topic, delivery.data);
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod client_builder;
mod config;
mod connection;
mod connection_state;
mod connector;
mod dispatcher;
mod metrics;
mod reconnect;

pub use client::ArenaClient;
pub use client_builder::ClientBuilder;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, Identity, Inbound};
pub use connection_state::{ConnectionEvent, ConnectionState};
pub use connector::{Connector, Frame, FrameSink, FrameStream, Socket, TungsteniteConnector};
pub use dispatcher::{Delivery, Dispatcher, Subscriber, SubscriberId};
pub use metrics::ClientMetrics;
pub use reconnect::{FixedDelay, ReconnectionStrategy, DEFAULT_RECONNECT_DELAY};
