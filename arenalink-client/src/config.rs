//! Client configuration
//!
//! Where the attraction server lives and how this screen identifies itself.
//! Values can be set in code, deserialized from a config file, or read from
//! the environment:
//!
//! | Variable                         | Default            |
//! |----------------------------------|--------------------|
//! | `ARENALINK_HOST`                 | `192.168.1.5:3000` |
//! | `ARENALINK_WS_PATH`              | `/ws`              |
//! | `ARENALINK_DEVICE_ID`            | `admin`            |
//! | `ARENALINK_SOCKET_TYPE`          | `1`                |
//! | `ARENALINK_RECONNECT_DELAY_SECS` | `10`               |

use crate::reconnect::DEFAULT_RECONNECT_DELAY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "192.168.1.5:3000";
pub const DEFAULT_PATH: &str = "/ws";
pub const DEFAULT_DEVICE_ID: &str = "admin";
/// Socket type of the admin app
pub const DEFAULT_SOCKET_TYPE: &str = "1";

/// Connection settings for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the attraction server
    pub host: String,
    pub path: String,
    pub device_id: String,
    pub socket_type: String,
    /// Wait after a socket error before reconnecting
    #[serde(with = "secs")]
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            path: DEFAULT_PATH.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            socket_type: DEFAULT_SOCKET_TYPE.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from `ARENALINK_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let reconnect_delay = match lookup("ARENALINK_RECONNECT_DELAY_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    tracing::warn!(value = %value, "Invalid ARENALINK_RECONNECT_DELAY_SECS, using default");
                    defaults.reconnect_delay
                }
            },
            None => defaults.reconnect_delay,
        };

        Self {
            host: lookup("ARENALINK_HOST").unwrap_or(defaults.host),
            path: lookup("ARENALINK_WS_PATH").unwrap_or(defaults.path),
            device_id: lookup("ARENALINK_DEVICE_ID").unwrap_or(defaults.device_id),
            socket_type: lookup("ARENALINK_SOCKET_TYPE").unwrap_or(defaults.socket_type),
            reconnect_delay,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn with_socket_type(mut self, socket_type: impl Into<String>) -> Self {
        self.socket_type = socket_type.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// WebSocket address, `ws://<host><path>`
    pub fn address(&self) -> String {
        format!("ws://{}{}", self.host, self.path)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(delay.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
