//! Derivation of MQTT connection settings from a destination descriptor

use crate::error::Result;
use crate::models::{DestinationDescriptor, Scheme};
use crate::transport::tls::{web_client_config, TlsMaterial};
use rumqttc::{MqttOptions, TlsConfiguration, Transport};
use std::path::Path;
use std::sync::Arc;

/// Largest remaining length the MQTT fixed header can encode
pub const MAX_PACKET_SIZE: usize = 268_435_455;

const GENERATED_CLIENT_ID_PREFIX: &str = "distro";

/// Connection settings for one destination, ready to build a client from.
#[derive(Clone)]
pub struct ConnectionSettings {
    scheme: Scheme,
    broker_uri: String,
    client_id: String,
    options: MqttOptions,
}

impl ConnectionSettings {
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn broker_uri(&self) -> &str {
        &self.broker_uri
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether a client certificate is presented over TLS
    pub fn is_secured(&self) -> bool {
        self.scheme.is_secured()
    }

    pub fn options(&self) -> &MqttOptions {
        &self.options
    }
}

/// Build connection settings for `descriptor`.
///
/// The certificate and key paths are read only for tcps/ssl/tls; a
/// failure to load them is the only error this returns.
pub fn derive_options(
    descriptor: &DestinationDescriptor,
    cert: &Path,
    key: &Path,
) -> Result<ConnectionSettings> {
    let scheme = descriptor.scheme();
    let broker_uri = descriptor.broker_uri();
    let client_id = client_id_for(&descriptor.publisher);

    // rumqttc dials websocket brokers from the full URL handed in as host
    let host = if scheme.is_websocket() {
        broker_uri.clone()
    } else {
        descriptor.address.clone()
    };

    let mut options = MqttOptions::new(client_id.clone(), host, descriptor.port);
    options.set_clean_session(true);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    if !descriptor.user.is_empty() {
        options.set_credentials(descriptor.user.clone(), descriptor.password.clone());
    }

    match &scheme {
        Scheme::Tls => {
            let config = TlsMaterial::load(cert, key)?.into_insecure_client_config()?;
            options.set_transport(Transport::Tls(TlsConfiguration::Rustls(Arc::new(config))));
        }
        Scheme::Ws => {
            options.set_transport(Transport::Ws);
        }
        Scheme::Wss => {
            let config = web_client_config();
            options.set_transport(Transport::Wss(TlsConfiguration::Rustls(Arc::new(config))));
        }
        Scheme::Tcp | Scheme::Other(_) => {}
    }

    Ok(ConnectionSettings {
        scheme,
        broker_uri,
        client_id,
        options,
    })
}

/// MQTT client id for a configured publisher name. The client library
/// refuses empty ids and ids with leading whitespace.
fn client_id_for(publisher: &str) -> String {
    let trimmed = publisher.trim_start();
    if trimmed.is_empty() {
        format!("{}-{}", GENERATED_CLIENT_ID_PREFIX, uuid::Uuid::new_v4())
    } else {
        trimmed.to_string()
    }
}
