//! Shared configuration, logging and error types for slotsync

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;

pub use bootstrap::load_config;
pub use config::{
    Config, DiscoveryConfig, DiscoveryMethod, DnsDiscoveryConfig, HaproxyConfig, LoggingConfig,
};
pub use error::{Error, Result};
