//! Data models for distro

pub mod configuration;
pub mod destination;

pub use configuration::*;
pub use destination::*;
