//! Client facade
//!
//! [`ArenaClient`] bundles the connection manager and the topic dispatcher of
//! one screen. Most apps need exactly one of them, so a process-wide default
//! can be installed once and fetched anywhere with [`ArenaClient::global`].

use crate::client_builder::ClientBuilder;
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::connection_state::{ConnectionEvent, ConnectionState};
use crate::dispatcher::{Dispatcher, Subscriber, SubscriberId};
use arenalink_core::{Command, Result, Topic};
use serde::Serialize;
use std::sync::OnceLock;
use tokio::sync::broadcast;

static GLOBAL: OnceLock<ArenaClient> = OnceLock::new();

/// Connection manager plus topic dispatcher
#[derive(Clone)]
pub struct ArenaClient {
    config: ClientConfig,
    connection: ConnectionManager,
    dispatcher: Dispatcher,
}

impl ArenaClient {
    pub(crate) fn new(config: ClientConfig, connection: ConnectionManager, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            connection,
            dispatcher,
        }
    }

    /// Start building a client for `config`
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Make this client the process-wide default
    ///
    /// Returns the installed default. If one was already installed, this
    /// client is shut down and the existing default is returned.
    pub fn install(self) -> &'static ArenaClient {
        let mut fresh = false;
        let installed = GLOBAL.get_or_init(|| {
            fresh = true;
            self.clone()
        });
        if !fresh {
            tracing::warn!("A default client is already installed");
            let _ = self.shutdown();
        }
        installed
    }

    /// The process-wide default, if one was installed
    pub fn global() -> Option<&'static ArenaClient> {
        GLOBAL.get()
    }

    /// Connect to the configured address
    pub fn connect(&self) -> Result<()> {
        self.connection.connect(self.config.address())
    }

    /// Connect to an explicit address, e.g. after the operator changed hosts
    pub fn connect_to(&self, address: impl Into<String>) -> Result<()> {
        self.connection.connect(address)
    }

    pub async fn subscribe(
        &self,
        topics: impl IntoIterator<Item = Topic>,
        subscriber: impl Subscriber,
    ) -> SubscriberId {
        self.dispatcher.subscribe(topics, subscriber).await
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.dispatcher.unsubscribe(id).await
    }

    pub fn send_command(&self, command: impl Into<Command>) -> Result<()> {
        self.connection.send_command(command)
    }

    pub fn send_json<T: Serialize>(&self, message: &T) -> Result<()> {
        self.connection.send_json(message)
    }

    pub fn query_data(&self, topic: Topic) -> Result<()> {
        self.dispatcher.query_data(topic)
    }

    pub fn enter_background(&self) -> Result<()> {
        self.connection.enter_background()
    }

    pub fn enter_foreground(&self) -> Result<()> {
        self.connection.enter_foreground()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.events()
    }

    /// Close the socket and stop both background tasks
    pub fn shutdown(&self) -> Result<()> {
        self.connection.shutdown()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
