//! Codec for arena protocol frames
//!
//! Encoding is plain serde. Decoding is stricter than deserializing straight
//! into [`Envelope`]: the session needs to tell apart the three ways a frame
//! can be malformed so it can log and count them.
//!
//! # Examples
//!
//! ```rust
//! use arenalink_core::{codec, Command, Error};
//!
//! let text = codec::encode(&Command::new("queryHallData")).unwrap();
//! assert_eq!(text, r#"{"cmd":"queryHallData"}"#);
//!
//! let envelope = codec::decode_envelope(r#"{"cmd":"HallData","data":[]}"#).unwrap();
//! assert_eq!(envelope.cmd, "HallData");
//!
//! assert_eq!(codec::decode_envelope("{}"), Err(Error::MissingCmd));
//! ```

use crate::error::{Error, Result};
use crate::types::Envelope;
use serde::Serialize;
use serde_json::Value;

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode one inbound text frame
///
/// # Errors
///
/// - `Error::InvalidJson` if the text isn't JSON
/// - `Error::NotAnObject` for arrays, strings, numbers and the like
/// - `Error::MissingCmd` if there is no `cmd` field or it isn't a string
pub fn decode_envelope(text: &str) -> Result<Envelope> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| Error::InvalidJson(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(Error::NotAnObject);
    };

    let cmd = match object.remove("cmd") {
        Some(Value::String(cmd)) => cmd,
        _ => return Err(Error::MissingCmd),
    };
    let data = object.remove("data").unwrap_or(Value::Null);

    Ok(Envelope { cmd, data })
}
