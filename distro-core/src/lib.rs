//! # Distro Core Library
//!
//! Outbound delivery of export payloads to MQTT brokers: destination
//! models, configuration, the MQTT sender and logging setup.

pub mod error;
pub mod models;
pub mod services;
pub mod transport;

pub use error::{Result, SenderError};
pub use transport::{MqttSender, SendContext, Sender};
