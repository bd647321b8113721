//! Error taxonomy for the outbound sender

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or driving an outbound sender.
///
/// Only `Configuration` escapes construction. The per-call variants are
/// logged and collapsed to `false` by [`crate::transport::Sender::send`].
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed loading x509 data (cert={cert:?}, key={key:?}): {reason}")]
    Configuration {
        cert: PathBuf,
        key: PathBuf,
        reason: String,
    },

    #[error("Could not connect to mqtt server: {0}")]
    Connection(String),

    #[error("Failed to publish: {0}")]
    Publish(String),
}

impl SenderError {
    pub(crate) fn configuration(
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        SenderError::Configuration {
            cert: cert.into(),
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SenderError>;
