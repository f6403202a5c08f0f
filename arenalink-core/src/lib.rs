//! Core protocol types and codec for arenalink
//!
//! This crate holds everything about the arena control-room protocol that
//! doesn't depend on a live socket:
//!
//! - **Types**: inbound [`Envelope`]s, outbound [`Command`]s, the
//!   [`Handshake`] and the [`Topic`] enum
//! - **Codec**: JSON encoding and strict envelope decoding
//! - **Error handling**: one error enum for the whole stack
//! - **Observability**: `tracing` subscriber and OpenTelemetry setup
//!
//! The `arenalink-client` crate builds the reconnecting session and the
//! topic dispatcher on top of it.
//!
//! # Example
//!
//! ```rust
//! use arenalink_core::{codec, Topic};
//!
//! let envelope = codec::decode_envelope(r#"{"cmd":"HallData","data":[]}"#).unwrap();
//! assert_eq!(envelope.topic(), Some(Topic::HallData));
//! assert!(Topic::HallData.is_pull());
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{Command, Envelope, Handshake, Topic, INIT_CMD, QUERY_PREFIX};
