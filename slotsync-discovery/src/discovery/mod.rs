//! Peer discovery
//!
//! A discovery method publishes [`SlotTable`] snapshots on a channel: the first
//! one as soon as it is available (even if every slot is empty), then one each
//! time the table materially changes. The channel has a single consumer, so
//! snapshots are never processed concurrently.

pub mod dns;
pub mod noop;

pub use dns::DnsDiscovery;
pub use noop::NoopDiscovery;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use slotsync_core::{Config, DiscoveryMethod};

use crate::error::{DiscoveryError, Result};
use crate::host::SlotTable;

/// A source of slot table snapshots
pub trait Discovery: Send {
    fn method(&self) -> DiscoveryMethod;

    /// Spawn the discovery loop and return immediately
    ///
    /// The task ends with `Ok(())` when `cancel` fires or the receiver is
    /// dropped, and with an error only when discovery cannot continue.
    fn start(
        self: Box<Self>,
        snapshots: mpsc::Sender<SlotTable>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<()>>;
}

/// Build and initialise the configured discovery method
pub fn new_discovery(config: &Config) -> Result<Box<dyn Discovery>> {
    let discovery: Box<dyn Discovery> = match config.discovery_method() {
        Some(DiscoveryMethod::Dns) => Box::new(DnsDiscovery::new(config)?),
        Some(DiscoveryMethod::Noop) => Box::new(NoopDiscovery::new(config.haproxy.slots)),
        None => {
            return Err(DiscoveryError::Configuration(
                "discovery.method is not set".to_string(),
            ))
        }
    };

    tracing::info!(method = discovery.method().as_str(), "Discovery initialised");
    Ok(discovery)
}
