//! Error types for peer discovery

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Discovery error types
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to read resolver config {path}: {source}")]
    ResolvConf {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse resolver config {path}: {reason}")]
    ResolvConfParse { path: PathBuf, reason: String },

    #[error("Transport error querying {name}@{server}: {source}")]
    Transport {
        name: String,
        server: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout querying {name}@{server}")]
    Timeout { name: String, server: SocketAddr },

    #[error("Malformed DNS message from {server}: {reason}")]
    Protocol { server: SocketAddr, reason: String },

    #[error("NXDOMAIN {name}@{server}")]
    NxDomain { name: String, server: SocketAddr },

    #[error("Unknown DNS failure. Code: {code}")]
    DnsFailure { code: u16 },

    /// The server answered with SRV records but did not attach an address
    /// record for each of them. Resolving the targets separately is not
    /// implemented.
    #[error("not implemented: {srv_count} SRV answers but {a_count} address records")]
    IncompleteAdditional { srv_count: usize, a_count: usize },

    #[error("not implemented: no address record for SRV target {target}")]
    MissingAddress { target: String },
}

impl DiscoveryError {
    /// Whether the error leaves the process in a state it cannot run in.
    /// Everything else only fails the current cycle.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::ResolvConf { .. }
                | Self::ResolvConfParse { .. }
                | Self::IncompleteAdditional { .. }
                | Self::MissingAddress { .. }
        )
    }
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let server: SocketAddr = "127.0.0.1:53".parse().unwrap();

        assert!(DiscoveryError::IncompleteAdditional { srv_count: 2, a_count: 1 }.is_fatal());
        assert!(DiscoveryError::MissingAddress { target: "a.".to_string() }.is_fatal());
        assert!(!DiscoveryError::NxDomain { name: "a.".to_string(), server }.is_fatal());
        assert!(!DiscoveryError::Timeout { name: "a.".to_string(), server }.is_fatal());
        assert!(!DiscoveryError::DnsFailure { code: 2 }.is_fatal());
    }

    #[test]
    fn test_nxdomain_message() {
        let err = DiscoveryError::NxDomain {
            name: "_peer._tcp.example.".to_string(),
            server: "10.0.0.2:53".parse().unwrap(),
        };
        assert_eq!(err.to_string(), "NXDOMAIN _peer._tcp.example.@10.0.0.2:53");
    }
}
