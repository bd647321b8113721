//! Logging service

use crate::models::LogLevel;

/// Initialize logging with the specified level
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match level {
        LogLevel::Error => "distro=error,distro_core=error",
        LogLevel::Warn => "distro=warn,distro_core=warn",
        LogLevel::Info => "distro=info,distro_core=info",
        LogLevel::Debug => "distro=debug,distro_core=debug",
        LogLevel::Trace => "distro=trace,distro_core=trace,rumqttc=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}

/// Span carried by a sender for its whole lifetime; every log line it
/// emits is recorded inside it.
pub fn sender_span(broker: &str, topic: &str) -> tracing::Span {
    tracing::info_span!("mqtt_sender", broker = broker, topic = topic)
}

/// Upper-case hex rendering of a payload for diagnostics
pub fn hex_payload(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}
