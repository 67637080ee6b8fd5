//! Nameservers and search list from a resolv.conf file

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use resolv_conf::ScopedIp;

use crate::error::{DiscoveryError, Result};

/// The parts of resolv.conf needed to issue queries ourselves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    pub nameservers: Vec<IpAddr>,
    /// Fully-qualified search domains, in order
    pub search: Vec<String>,
    pub ndots: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            search: Vec::new(),
            ndots: 1,
        }
    }
}

impl ResolverSettings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| DiscoveryError::ResolvConf {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&bytes).map_err(|reason| DiscoveryError::ResolvConfParse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        let parsed = resolv_conf::Config::parse(bytes).map_err(|e| e.to_string())?;

        let nameservers = parsed
            .nameservers
            .iter()
            .map(|ns| match ns {
                ScopedIp::V4(ip) => IpAddr::V4(*ip),
                ScopedIp::V6(ip, _) => IpAddr::V6(*ip),
            })
            .collect();

        // `search` wins over `domain` when both are present
        let search = parsed
            .get_search()
            .cloned()
            .or_else(|| parsed.get_domain().map(|d| vec![d.clone()]))
            .unwrap_or_default()
            .iter()
            .map(|s| fqdn(s))
            .collect();

        Ok(Self {
            nameservers,
            search,
            ndots: parsed.ndots as usize,
        })
    }

    /// `host:port` for every configured nameserver
    #[must_use]
    pub fn server_addrs(&self, port: u16) -> Vec<SocketAddr> {
        self.nameservers
            .iter()
            .map(|ip| SocketAddr::new(*ip, port))
            .collect()
    }

    /// Candidate fully-qualified names to query for `name`
    ///
    /// A name that is already fully qualified is used as is. Otherwise the
    /// search domains are appended in order, and the bare name is tried first
    /// when it has more labels than `ndots`, last when it does not.
    #[must_use]
    pub fn name_list(&self, name: &str) -> Vec<String> {
        if is_fqdn(name) {
            return vec![name.to_string()];
        }

        let has_ndots = count_labels(name) > self.ndots;
        let name = fqdn(name);

        let mut names = Vec::with_capacity(self.search.len() + 1);
        if has_ndots {
            names.push(name.clone());
        }
        for domain in &self.search {
            names.push(fqdn(&format!("{name}{domain}")));
        }
        if !has_ndots {
            names.push(name);
        }
        names
    }
}

fn is_fqdn(name: &str) -> bool {
    name.ends_with('.')
}

fn fqdn(name: &str) -> String {
    if is_fqdn(name) {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

fn count_labels(name: &str) -> usize {
    name.split('.').filter(|label| !label.is_empty()).count()
}
