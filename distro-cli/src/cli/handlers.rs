//! CLI command handlers

use anyhow::{Context, Result};
use distro_core::models::{Configuration, DestinationConfig};
use distro_core::services::logging::init_logging;
use distro_core::transport::{MqttSender, SendContext, Sender};
use serde::Serialize;
use std::path::PathBuf;

/// Load configuration from `path` or the default location
fn load_configuration(path: Option<PathBuf>) -> Result<Configuration> {
    let path = match path {
        Some(path) => path,
        None => Configuration::default_config_path()
            .map_err(|e| anyhow::anyhow!("Failed to resolve config path: {}", e))?,
    };

    Configuration::load_from_file(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))
}

/// Install the log subscriber for `config`. A subscriber already installed
/// in this process is kept and reported on stderr.
fn setup_logging(config: &Configuration) -> bool {
    match init_logging(config.log_level.clone()) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Logging already initialized, keeping existing subscriber: {}", e);
            false
        }
    }
}

fn ensure_valid(config: &Configuration) -> Result<()> {
    config.validate().map_err(|errors| {
        anyhow::anyhow!("Invalid configuration:\n  {}", errors.join("\n  "))
    })
}

fn build_sender(destination: &DestinationConfig) -> Result<MqttSender> {
    MqttSender::new(
        &destination.descriptor,
        destination.cert_path(),
        destination.key_path(),
    )
    .with_context(|| format!("Cannot build sender for {}", destination.descriptor.name))
}

/// Payload from inline text or a file
fn read_payload(data: Option<String>, file: Option<PathBuf>) -> Result<Vec<u8>> {
    match (data, file) {
        (Some(data), _) => Ok(data.into_bytes()),
        (None, Some(file)) => std::fs::read(&file)
            .with_context(|| format!("Failed to read payload file: {}", file.display())),
        (None, None) => Err(anyhow::anyhow!("Either --data or --file is required")),
    }
}

/// Handle the 'send' command
pub async fn handle_send(
    config_path: Option<PathBuf>,
    destination: String,
    data: Option<String>,
    file: Option<PathBuf>,
    correlation_id: Option<String>,
) -> Result<()> {
    let config = load_configuration(config_path)?;
    setup_logging(&config);
    ensure_valid(&config)?;

    let target = config
        .destination(&destination)
        .ok_or_else(|| anyhow::anyhow!("Unknown destination: {}", destination))?;
    let payload = read_payload(data, file)?;
    let sender = build_sender(target)?;

    let ctx = SendContext {
        correlation_id,
        deadline: None,
    };

    if sender.send(&payload, &ctx).await {
        println!(
            "Sent {} bytes to {} ({})",
            payload.len(),
            sender.broker_uri(),
            sender.topic()
        );
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Delivery to {} failed, see log for details",
            destination
        ))
    }
}

/// Handle the 'check' command
pub fn handle_check(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_configuration(config_path)?;
    setup_logging(&config);
    ensure_valid(&config)?;

    let mut failed = 0;
    for destination in &config.destinations {
        match build_sender(destination) {
            Ok(sender) => println!(
                "ok      {} -> {} ({})",
                destination.descriptor.name,
                sender.broker_uri(),
                sender.topic()
            ),
            Err(e) => {
                failed += 1;
                println!("failed  {}: {:#}", destination.descriptor.name, e);
            }
        }
    }

    if failed > 0 {
        return Err(anyhow::anyhow!("{} destination(s) failed to load", failed));
    }
    Ok(())
}

/// Destination listing; never includes credentials
#[derive(Debug, Serialize, PartialEq)]
struct DestinationSummary {
    name: String,
    broker: String,
    topic: String,
    secured: bool,
}

impl From<&DestinationConfig> for DestinationSummary {
    fn from(destination: &DestinationConfig) -> Self {
        let d = &destination.descriptor;
        Self {
            name: d.name.clone(),
            broker: d.broker_uri(),
            topic: d.topic.clone(),
            secured: d.scheme().is_secured(),
        }
    }
}

/// Handle the 'destinations' command
pub fn handle_destinations(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_configuration(config_path)?;
    let summaries: Vec<DestinationSummary> =
        config.destinations.iter().map(DestinationSummary::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No destinations configured");
    }
    for s in &summaries {
        let lock = if s.secured { " [tls]" } else { "" };
        println!("{}  {} -> {}{}", s.name, s.broker, s.topic, lock);
    }
    Ok(())
}
