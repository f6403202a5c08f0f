//! arenalink - arena control-room client over WebSocket
//!
//! This is the main convenience crate that re-exports the arenalink
//! sub-crates, so an app needs a single dependency.
//!
//! # Architecture
//!
//! - **arenalink-core**: protocol types, codec, error handling, observability
//! - **arenalink-client**: reconnecting session, topic dispatcher, client facade
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use arenalink::{ArenaClient, ClientConfig, Topic};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ArenaClient::builder(ClientConfig::new("192.168.1.5:3000"))
//!         .build()?
//!         .install();
//!
//!     client
//!         .subscribe([Topic::HallData], |topic: Topic, data: &Value| {
//!             println!("{}: {}", topic, data);
//!         })
//!         .await;
//!     client.connect()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.shutdown()?;
//!     Ok(())
//! }
//! ```

pub use arenalink_client as client;
pub use arenalink_core as core;

// Convenience re-exports of the most commonly used types
pub use arenalink_client::{ArenaClient, ClientBuilder, ClientConfig, Delivery, SubscriberId};
pub use arenalink_core::{Command, Error, Result, Topic};
