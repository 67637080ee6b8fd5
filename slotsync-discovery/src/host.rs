//! Discovered peers and the fixed-size slot table they are placed in
//!
//! HAProxy keeps its consistent hash ring keyed on the position of each server
//! in the `server-template`. A peer therefore has to land in the same slot on
//! every discovery cycle, which is why slots are derived from the peer's
//! hostname (`name-3` goes to slot 3) and never from answer order.

use std::fmt;

/// One discovered peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Host {
    /// Short hostname, e.g. `cache-2`
    pub name: String,
    /// Fully-qualified name as returned by DNS, e.g. `cache-2.cache.svc.cluster.local.`
    pub fqdn: String,
    pub ip: String,
    pub port: u16,
}

impl Host {
    /// A host with no address marks a slot without a peer
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ip.is_empty()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name={} FQDN={} IP={} Port={}",
            self.name, self.fqdn, self.ip, self.port
        )
    }
}

/// Fixed-length table of hosts indexed by slot
///
/// Two tables are equal when they have the same length and every slot holds
/// an identical [`Host`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotTable {
    slots: Vec<Host>,
}

impl SlotTable {
    /// Table of `len` empty slots
    #[must_use]
    pub fn empty(len: usize) -> Self {
        Self {
            slots: vec![Host::default(); len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots that currently hold a peer
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|h| !h.is_empty()).count()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Host> {
        self.slots.get(index)
    }

    /// Place `host` at `index`. Returns false and leaves the table untouched
    /// when the index is out of range.
    pub fn set(&mut self, index: usize, host: Host) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = host;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Host)> {
        self.slots.iter().enumerate()
    }
}

impl From<Vec<Host>> for SlotTable {
    fn from(slots: Vec<Host>) -> Self {
        Self { slots }
    }
}

/// Hostname portion of a DNS name: everything before the first `.`
#[must_use]
pub fn short_hostname(name: &str) -> &str {
    name.split_once('.').map_or(name, |(host, _)| host)
}

/// Slot index encoded in a `[name]-[number]` hostname
///
/// Returns `None` when the text after the last `-` is not a number.
#[must_use]
pub fn slot_from_hostname(hostname: &str) -> Option<usize> {
    hostname.rsplit('-').next()?.parse().ok()
}
