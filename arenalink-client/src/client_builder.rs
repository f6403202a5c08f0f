//! Client builder for configuring reconnection and other options
//!
//! The `ClientBuilder` provides a fluent API for assembling an
//! [`ArenaClient`] before it connects. It allows you to:
//! - Replace the reconnection strategy (fixed delay from the config by default)
//! - Swap the socket connector, e.g. for in-memory sockets in tests
//! - Configure observability (OpenTelemetry)
//! - Set service name for telemetry
//!
//! # Examples
//!
//! ```rust,no_run
//! use arenalink_client::{ClientBuilder, ClientConfig, FixedDelay};
//! use std::time::Duration;
//!
//! # async fn example() -> arenalink_core::Result<()> {
//! let client = ClientBuilder::new(ClientConfig::new("192.168.1.5:3000"))
//!     .with_reconnect(Box::new(FixedDelay::new(Duration::from_secs(2))))
//!     .build()?;
//! client.connect()?;
//!
//! // With observability
//! let client2 = ClientBuilder::new(ClientConfig::from_env())
//!     .with_default_observability()
//!     .service_name("hall-screen")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::client::ArenaClient;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, Identity};
use crate::connector::{Connector, TungsteniteConnector};
use crate::dispatcher::Dispatcher;
use crate::metrics::ClientMetrics;
use crate::reconnect::{FixedDelay, ReconnectionStrategy};
use arenalink_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;

/// Builder for configuring and creating an [`ArenaClient`]
pub struct ClientBuilder {
    config: ClientConfig,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    connector: Option<Arc<dyn Connector>>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            reconnect_strategy: None,
            connector: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Reconnect with the given strategy instead of the configured fixed delay
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    /// Open sockets through `connector` instead of `tokio-tungstenite`
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Spawn the session and dispatcher tasks
    ///
    /// Must be called inside a tokio runtime. The client doesn't connect until
    /// [`ArenaClient::connect`] is called.
    pub fn build(self) -> Result<ArenaClient> {
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            arenalink_core::init_observability(config.clone())
                .map_err(|e| Error::Internal(format!("Failed to initialize observability: {}", e)))?;

            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else {
            None
        };

        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(FixedDelay::new(self.config.reconnect_delay)));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector));
        let identity = Identity::new(self.config.device_id.clone(), self.config.socket_type.clone());

        tracing::debug!(
            device_id = %identity.device_id,
            socket_type = %identity.socket_type,
            "Building client"
        );

        let (connection, inbound) =
            ConnectionManager::spawn(identity, connector, strategy, metrics.clone());
        let dispatcher = Dispatcher::spawn(connection.clone(), inbound, metrics);

        Ok(ArenaClient::new(self.config, connection, dispatcher))
    }
}
