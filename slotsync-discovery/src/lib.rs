pub mod discovery;
pub mod dns;
pub mod error;
pub mod host;

pub use discovery::{new_discovery, Discovery, DnsDiscovery, NoopDiscovery};
pub use error::{DiscoveryError, Result};
pub use host::{Host, SlotTable};
