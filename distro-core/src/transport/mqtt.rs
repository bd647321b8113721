//! MQTT sender
//!
//! Connects lazily on the first send, then publishes every payload to one
//! fixed topic at QoS 0, non-retained. The rumqttc event loop is driven only
//! from inside [`Sender::send`]; no background task keeps the connection
//! alive or reconnects it. Each send first drains whatever the event loop
//! already has ready, so a connection the broker dropped while idle is
//! noticed there and reopened before publishing.

use crate::error::{Result, SenderError};
use crate::models::{DestinationDescriptor, Scheme};
use crate::services::logging::{hex_payload, sender_span};
use crate::transport::options::{derive_options, ConnectionSettings};
use crate::transport::{SendContext, Sender};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, Span};

/// Capacity of the request channel between client and event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Upper bound on ready events consumed by one status check
const MAX_STATUS_EVENTS: usize = 32;

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub connect_attempts: u64,
    pub messages_sent: u64,
    pub messages_failed: u64,
}

/// Client handle plus the event loop that owns its network connection
struct Connection {
    client: AsyncClient,
    eventloop: EventLoop,
    connected: bool,
    /// Set once the broker acknowledged a CONNECT on this handle
    used: bool,
}

impl Connection {
    fn open(settings: &ConnectionSettings) -> Self {
        let (client, eventloop) =
            AsyncClient::new(settings.options().clone(), REQUEST_CHANNEL_CAPACITY);
        Self {
            client,
            eventloop,
            connected: false,
            used: false,
        }
    }

    /// Poll the event loop until the broker answers CONNECT
    async fn connect(&mut self) -> Result<()> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected = true;
                    self.used = true;
                    return Ok(());
                }
                Ok(event) => tracing::trace!(?event, "Ignoring event while connecting"),
                Err(e) => return Err(SenderError::Connection(e.to_string())),
            }
        }
    }

    /// Consume events that are ready without waiting and report whether the
    /// connection survived them. EOF, I/O errors, a missed ping response and
    /// a broker DISCONNECT all clear `connected`.
    async fn refresh(&mut self) -> bool {
        if !self.connected {
            return false;
        }

        for _ in 0..MAX_STATUS_EVENTS {
            // A zero timeout still polls the event loop once before expiring
            match tokio::time::timeout(Duration::ZERO, self.eventloop.poll()).await {
                Err(_) => break,
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    tracing::info!("Broker closed the mqtt connection");
                    self.connected = false;
                    break;
                }
                Ok(Ok(event)) => tracing::trace!(?event, "Drained idle event"),
                Ok(Err(e)) => {
                    tracing::info!(error = %e, "Lost connection to mqtt server");
                    self.connected = false;
                    break;
                }
            }
        }

        self.connected
    }

    /// Queue a QoS 0 publish and poll until it has been written out
    async fn publish(&mut self, topic: &str, data: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, data.to_vec())
            .await
            .map_err(|e| SenderError::Publish(e.to_string()))?;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Publish(_))) => return Ok(()),
                Ok(event) => tracing::trace!(?event, "Ignoring event while publishing"),
                Err(e) => {
                    self.connected = false;
                    return Err(SenderError::Publish(e.to_string()));
                }
            }
        }
    }
}

/// Sender publishing to one MQTT destination.
///
/// The connect-then-publish sequence runs under a lock, so concurrent
/// sends on one instance are serialized and never open two connections.
pub struct MqttSender {
    name: String,
    topic: String,
    settings: ConnectionSettings,
    connection: Mutex<Connection>,
    span: Span,
    connect_attempts: AtomicU64,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
}

impl MqttSender {
    /// Create a sender for `descriptor`. Does not connect.
    ///
    /// `cert` and `key` are only read for tcps/ssl/tls destinations. A
    /// failure to load them is logged and returned; it will not go away by
    /// retrying with the same files.
    pub fn new(
        descriptor: &DestinationDescriptor,
        cert: impl AsRef<Path>,
        key: impl AsRef<Path>,
    ) -> Result<Self> {
        let (cert, key) = (cert.as_ref(), key.as_ref());
        let settings = derive_options(descriptor, cert, key).map_err(|e| {
            tracing::error!(
                cert = %cert.display(),
                key = %key.display(),
                error = %e,
                "Failed loading x509 data"
            );
            e
        })?;

        let name = if descriptor.name.is_empty() {
            "mqtt".to_string()
        } else {
            descriptor.name.clone()
        };

        Ok(Self::from_settings(name, settings, descriptor.topic.clone()))
    }

    fn from_settings(name: String, settings: ConnectionSettings, topic: String) -> Self {
        let span = sender_span(settings.broker_uri(), &topic);
        let connection = Mutex::new(Connection::open(&settings));
        Self {
            name,
            topic,
            settings,
            connection,
            span,
            connect_attempts: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn broker_uri(&self) -> &str {
        self.settings.broker_uri()
    }

    /// Whether the transport presents a client certificate over TLS
    pub fn is_secured(&self) -> bool {
        self.settings.is_secured()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Last known connection state. Waits for an in-flight send to finish.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.connected
    }

    pub fn stats(&self) -> SenderStats {
        SenderStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
        }
    }

    async fn ensure_connected(&self, conn: &mut Connection) -> Result<()> {
        if conn.refresh().await {
            return Ok(());
        }
        if conn.used {
            // Dropped while idle: reconnect from a fresh handle
            *conn = Connection::open(&self.settings);
        }

        tracing::info!("Connecting to mqtt server");
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);

        if let Scheme::Other(scheme) = self.settings.scheme() {
            return Err(SenderError::Connection(format!(
                "unsupported scheme {:?}",
                scheme
            )));
        }

        conn.connect().await?;
        tracing::info!("Connected to mqtt server");
        Ok(())
    }

    async fn deliver(&self, data: &[u8]) -> bool {
        let mut conn = self.connection.lock().await;

        if let Err(e) = self.ensure_connected(&mut conn).await {
            tracing::error!(error = %e, "Could not connect to mqtt server, drop event");
            *conn = Connection::open(&self.settings);
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        tracing::debug!(data = %String::from_utf8_lossy(data), "Sending data");

        match conn.publish(&self.topic, data).await {
            Ok(()) => {
                tracing::debug!(data = %hex_payload(data), "Data sent");
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send data");
                // Start the next send from a fresh handle with nothing queued
                *conn = Connection::open(&self.settings);
                self.messages_failed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

#[async_trait]
impl Sender for MqttSender {
    async fn send(&self, data: &[u8], ctx: &SendContext) -> bool {
        let span = tracing::info_span!(
            parent: &self.span,
            "send",
            correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
            bytes = data.len()
        );
        self.deliver(data).instrument(span).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn descriptor(protocol: &str, port: u16) -> DestinationDescriptor {
        DestinationDescriptor {
            name: "unit".to_string(),
            protocol: protocol.to_string(),
            address: "127.0.0.1".to_string(),
            port,
            publisher: "unit-test".to_string(),
            topic: "events/out".to_string(),
            ..Default::default()
        }
    }

    /// A port nothing listens on
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_plain_sender_starts_disconnected() {
        let sender = MqttSender::new(&descriptor("tcp", 1883), "", "").unwrap();
        assert_eq!(sender.name(), "unit");
        assert_eq!(sender.topic(), "events/out");
        assert_eq!(sender.broker_uri(), "tcp://127.0.0.1:1883");
        assert!(!sender.is_secured());
        assert!(!sender.is_connected().await);
        assert_eq!(sender.stats(), SenderStats::default());
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_send() {
        let sender = MqttSender::new(&descriptor("tcp", closed_port()), "", "").unwrap();

        assert!(!sender.send(&[1, 2, 3], &SendContext::default()).await);
        assert!(!sender.is_connected().await);

        let stats = sender.stats();
        assert_eq!(stats.connect_attempts, 1);
        assert_eq!(stats.messages_failed, 1);
        assert_eq!(stats.messages_sent, 0);
    }

    #[tokio::test]
    async fn test_each_failed_send_attempts_a_new_connection() {
        let sender = MqttSender::new(&descriptor("tcp", closed_port()), "", "").unwrap();
        let ctx = SendContext::with_correlation_id("abc-123");

        assert!(!sender.send(b"one", &ctx).await);
        assert!(!sender.send(b"two", &ctx).await);
        assert_eq!(sender.stats().connect_attempts, 2);
    }

    #[tokio::test]
    async fn test_unsupported_scheme_fails_at_send() {
        let sender = MqttSender::new(&descriptor("gopher", 70), "", "").unwrap();
        assert!(!sender.send(b"payload", &SendContext::default()).await);
        assert!(!sender.is_connected().await);
    }

    #[tokio::test]
    async fn test_secured_scheme_without_material_fails_construction() {
        let result = MqttSender::new(
            &descriptor("ssl", 8883),
            "/nonexistent/cert.pem",
            "/nonexistent/key.pem",
        );
        assert!(matches!(result, Err(SenderError::Configuration { .. })));
    }
}
