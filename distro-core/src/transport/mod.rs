//! Outbound senders
//!
//! A sender is built once per destination and reused for every payload
//! routed to it. Failures never cross the [`Sender`] interface as errors:
//! they are logged and reported as `false`.

use async_trait::async_trait;
use std::time::Instant;

pub mod mqtt;
pub mod options;
pub mod tls;

pub use mqtt::{MqttSender, SenderStats};
pub use options::{derive_options, ConnectionSettings};
pub use tls::TlsMaterial;

/// Per-call context handed to [`Sender::send`].
///
/// The deadline is accepted for parity with other senders but is not
/// enforced: an in-flight connect or publish is never aborted.
#[derive(Debug, Clone, Default)]
pub struct SendContext {
    pub correlation_id: Option<String>,
    pub deadline: Option<Instant>,
}

impl SendContext {
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            deadline: None,
        }
    }
}

/// Abstract sender interface for export delivery
#[async_trait]
pub trait Sender: Send + Sync {
    /// Deliver `data` to the destination; `true` once the transport accepted it.
    async fn send(&self, data: &[u8], ctx: &SendContext) -> bool;

    /// Get sender name for logging
    fn name(&self) -> &str;
}
