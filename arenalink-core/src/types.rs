//! Protocol data types
//!
//! The attraction server speaks a small JSON protocol over WebSocket text
//! frames. Every frame is an object with a `cmd` field:
//!
//! - **Inbound** frames are [`Envelope`]s: `{"cmd": "<topic or init>", "data": <any>}`
//! - **Outbound** frames are [`Command`]s: `{"cmd": "<name>", ...fields}`
//! - The very first outbound frame on every socket is a [`Handshake`]
//!
//! Topics are the application-level message categories carried in `cmd`.
//! A topic whose identifier starts with an uppercase letter is a *pull*
//! topic: subscribing to it asks the server for current state with a
//! `query<Topic>` command. Lowercase topics are push-only.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// The reserved command name of the handshake exchange
pub const INIT_CMD: &str = "init";

/// Prefix of the query command issued for pull topics
pub const QUERY_PREFIX: &str = "query";

/// Application-level message category
///
/// The wire identifier of each variant is exactly what the server puts in
/// the `cmd` field; see [`Topic::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    HallData,
    ControllerData,
    #[serde(rename = "newMatch")]
    NewMatch,
    ArduinoList,
    #[serde(rename = "updateMatch")]
    UpdateMatch,
    #[serde(rename = "matchStop")]
    MatchStop,
    #[serde(rename = "startAnswer")]
    StartAnswer,
    #[serde(rename = "stopAnswer")]
    StopAnswer,
    #[serde(rename = "updatePlayerData")]
    UpdatePlayerData,
    QuestionCount,
    #[serde(rename = "laserInfo")]
    LaserInfo,
    QuickCheck,
    #[serde(rename = "error")]
    Error,
}

impl Topic {
    /// Every known topic, in declaration order
    pub const ALL: [Topic; 13] = [
        Topic::HallData,
        Topic::ControllerData,
        Topic::NewMatch,
        Topic::ArduinoList,
        Topic::UpdateMatch,
        Topic::MatchStop,
        Topic::StartAnswer,
        Topic::StopAnswer,
        Topic::UpdatePlayerData,
        Topic::QuestionCount,
        Topic::LaserInfo,
        Topic::QuickCheck,
        Topic::Error,
    ];

    /// The identifier used in the `cmd` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::HallData => "HallData",
            Topic::ControllerData => "ControllerData",
            Topic::NewMatch => "newMatch",
            Topic::ArduinoList => "ArduinoList",
            Topic::UpdateMatch => "updateMatch",
            Topic::MatchStop => "matchStop",
            Topic::StartAnswer => "startAnswer",
            Topic::StopAnswer => "stopAnswer",
            Topic::UpdatePlayerData => "updatePlayerData",
            Topic::QuestionCount => "QuestionCount",
            Topic::LaserInfo => "laserInfo",
            Topic::QuickCheck => "QuickCheck",
            Topic::Error => "error",
        }
    }

    /// Look a topic up by exact identifier match
    ///
    /// Returns `None` for `init` and for anything the client doesn't know,
    /// so unknown or future server messages can be dropped quietly.
    pub fn from_identifier(identifier: &str) -> Option<Topic> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == identifier)
    }

    /// Whether subscribing to this topic should proactively query the server
    pub fn is_pull(&self) -> bool {
        self.as_str()
            .chars()
            .next()
            .is_some_and(|first| first.is_uppercase())
    }

    /// Name of the command that asks the server for this topic's state
    pub fn query_command(&self) -> String {
        format!("{}{}", QUERY_PREFIX, self.as_str())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic identifier or `init`
    pub cmd: String,

    /// Topic-specific payload, opaque to the transport
    ///
    /// Frames without a `data` field carry `null`.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(cmd: impl Into<String>, data: Value) -> Self {
        Self {
            cmd: cmd.into(),
            data,
        }
    }

    /// Whether this is the server's handshake acknowledgement
    pub fn is_handshake(&self) -> bool {
        self.cmd == INIT_CMD
    }

    /// The topic this envelope belongs to, if the client knows it
    pub fn topic(&self) -> Option<Topic> {
        Topic::from_identifier(&self.cmd)
    }
}

/// Outbound command
///
/// Serializes as `{"cmd": name, ...fields}` with `cmd` first. A `cmd` entry
/// among the fields is ignored so it can never replace the command name.
///
/// # Examples
///
/// ```rust
/// use arenalink_core::Command;
/// use serde_json::json;
///
/// let command = Command::new("startMatch").with("mode", json!(1));
/// let text = serde_json::to_string(&command).unwrap();
/// assert_eq!(text, r#"{"cmd":"startMatch","mode":1}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    name: String,
    fields: Map<String, Value>,
}

impl Command {
    /// A bare command: `{"cmd": name}`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
        }
    }

    /// The `query<Topic>` command for a topic
    pub fn query(topic: Topic) -> Self {
        Self::new(topic.query_command())
    }

    /// Add an argument field
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "cmd" {
            self.fields.insert(key, value);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<&str> for Command {
    fn from(name: &str) -> Self {
        Command::new(name)
    }
}

impl From<String> for Command {
    fn from(name: String) -> Self {
        Command::new(name)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("cmd", &self.name)?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// First frame sent on every freshly opened socket
///
/// `ID` identifies the device, `TYPE` is the socket type code the server uses
/// to route messages (the admin app registers as `"1"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub cmd: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "TYPE")]
    pub socket_type: String,
}

impl Handshake {
    pub fn new(device_id: impl Into<String>, socket_type: impl Into<String>) -> Self {
        Self {
            cmd: INIT_CMD.to_string(),
            id: device_id.into(),
            socket_type: socket_type.into(),
        }
    }
}
