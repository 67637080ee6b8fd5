//! DNS plumbing used by [`DnsDiscovery`](crate::discovery::DnsDiscovery)

pub mod client;
pub mod resolv_conf;

pub use client::{DnsClient, Transport};
pub use resolv_conf::ResolverSettings;
