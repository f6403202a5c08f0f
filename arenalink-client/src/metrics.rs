//! Client metrics definitions
//!
//! OpenTelemetry instruments describing connection health for a screen.
//! They're recorded by the session task and the dispatcher when the client is
//! built with observability enabled.
//!
//! # Metrics Collected
//!
//! - **connection_state**: current state (gauge)
//! - **frames_received**: inbound text frames (counter)
//! - **frames_dropped**: inbound frames dropped, by reason (counter)
//! - **deliveries**: payloads handed to subscribers, by topic (counter)
//! - **commands_sent**: outbound frames written (counter)
//! - **reconnection_attempts**: sockets opened after the first (counter)
//! - **handshakes**: completed handshakes (counter)
//! - **errors_total**: transport errors, by type (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Connection state (0=idle, 1=connecting, 2=unverified, 3=verified, 4=disconnected)
    pub connection_state: Gauge<i64>,
    pub frames_received: Counter<u64>,
    pub frames_dropped: Counter<u64>,
    pub deliveries: Counter<u64>,
    pub commands_sent: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub handshakes: Counter<u64>,
    pub errors_total: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics with a custom meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("arenalink.client.connection.state")
                .with_description(
                    "Connection state (0=idle, 1=connecting, 2=unverified, 3=verified, 4=disconnected)",
                )
                .build(),
            frames_received: meter
                .u64_counter("arenalink.client.frames.received")
                .with_description("Inbound text frames received")
                .build(),
            frames_dropped: meter
                .u64_counter("arenalink.client.frames.dropped")
                .with_description("Inbound frames dropped without delivery")
                .build(),
            deliveries: meter
                .u64_counter("arenalink.client.deliveries")
                .with_description("Payloads delivered to subscribers")
                .build(),
            commands_sent: meter
                .u64_counter("arenalink.client.commands.sent")
                .with_description("Outbound frames written to the socket")
                .build(),
            reconnection_attempts: meter
                .u64_counter("arenalink.client.reconnection.attempts")
                .with_description("Sockets opened after a disconnect")
                .build(),
            handshakes: meter
                .u64_counter("arenalink.client.handshakes")
                .with_description("Handshakes acknowledged by the server")
                .build(),
            errors_total: meter
                .u64_counter("arenalink.client.errors.total")
                .with_description("Transport errors encountered")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: i64) {
        self.connection_state.record(state, &[]);
    }

    pub fn record_frame(&self) {
        self.frames_received.add(1, &[]);
    }

    /// Record a dropped frame (`invalid_json`, `missing_cmd`, `unverified`, `unknown_topic`, ...)
    pub fn record_dropped(&self, reason: &str) {
        let attributes = &[KeyValue::new("reason", reason.to_string())];
        self.frames_dropped.add(1, attributes);
    }

    pub fn record_delivery(&self, topic: &str, subscribers: u64) {
        let attributes = &[KeyValue::new("topic", topic.to_string())];
        self.deliveries.add(subscribers, attributes);
    }

    pub fn record_command(&self) {
        self.commands_sent.add(1, &[]);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_handshake(&self) {
        self.handshakes.add(1, &[]);
    }

    pub fn record_error(&self, error_type: &str) {
        let attributes = &[KeyValue::new("error_type", error_type.to_string())];
        self.errors_total.add(1, attributes);
    }
}
