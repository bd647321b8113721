//! Destination descriptor: where and how an export is delivered

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport scheme of a destination, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP ("tcp", "mqtt")
    Tcp,
    /// TLS over TCP with client certificate ("tcps", "ssl", "tls")
    Tls,
    /// WebSocket ("ws")
    Ws,
    /// WebSocket over TLS ("wss")
    Wss,
    /// Anything else, kept lower-cased. Rejected when connecting.
    Other(String),
}

impl Scheme {
    pub fn parse(protocol: &str) -> Self {
        let lowered = protocol.to_lowercase();
        match lowered.as_str() {
            "tcp" | "mqtt" => Scheme::Tcp,
            "tcps" | "ssl" | "tls" => Scheme::Tls,
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            _ => Scheme::Other(lowered),
        }
    }

    /// Whether the scheme requires loading client TLS material.
    pub fn is_secured(&self) -> bool {
        matches!(self, Scheme::Tls)
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Scheme::Ws | Scheme::Wss)
    }
}

/// Immutable description of one broker target and its credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DestinationDescriptor {
    /// Name used to select the destination from configuration
    #[serde(default)]
    pub name: String,
    /// Transport scheme as configured (e.g. "tcp", "SSL", "ws")
    pub protocol: String,
    /// Broker host
    pub address: String,
    /// Broker port
    pub port: u16,
    /// Path suffix appended to the broker URI, may be empty
    #[serde(default)]
    pub path: String,
    /// MQTT client identifier
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Topic every payload is published to
    pub topic: String,
}

impl DestinationDescriptor {
    pub fn scheme(&self) -> Scheme {
        Scheme::parse(&self.protocol)
    }

    /// `<scheme>://<address>:<port><path>` with the scheme lower-cased.
    pub fn broker_uri(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.to_lowercase(),
            self.address,
            self.port,
            self.path
        )
    }
}

impl fmt::Debug for DestinationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationDescriptor")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("publisher", &self.publisher)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("topic", &self.topic)
            .finish()
    }
}
