//! DNS SRV based peer discovery
//!
//! Peers are found by querying an SRV record. Each SRV target is expected to
//! follow the `[name]-[number]` hostname convention, where the number is the
//! peer's slot in HAProxy's `server-template`. `cache-0` goes to slot 0,
//! `cache-1` to slot 1, and so on, independent of answer order.
//!
//! Queries go straight to the nameservers listed in resolv.conf. Every
//! nameserver is tried with every search-domain permutation of the name until
//! one answers successfully.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{RData, Record};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use slotsync_core::{Config, DiscoveryMethod};

use super::Discovery;
use crate::dns::{DnsClient, ResolverSettings, Transport};
use crate::error::{DiscoveryError, Result};
use crate::host::{short_hostname, slot_from_hostname, Host, SlotTable};

/// Address used for the peer that is this machine
pub const LOOPBACK: &str = "127.0.0.1";

pub struct DnsDiscovery {
    slots: usize,
    refresh: Duration,
    servers: Vec<SocketAddr>,
    /// Candidate query names; narrowed to the first one that resolves
    names: Vec<String>,
    /// This machine's hostname, routed to loopback when it shows up as a peer
    hostname: String,
    client: DnsClient,
}

impl DnsDiscovery {
    /// Read resolv.conf and prepare the query plan
    pub fn new(config: &Config) -> Result<Self> {
        let settings = ResolverSettings::from_file(&config.discovery.dns.resolv_conf)?;

        let hostname = match hostname::get().map(|h| h.into_string()) {
            Ok(Ok(name)) => name,
            Ok(Err(raw)) => {
                tracing::warn!(
                    hostname = ?raw,
                    "Local hostname is not valid UTF-8, loopback routing disabled"
                );
                String::new()
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to read local hostname, loopback routing disabled"
                );
                String::new()
            }
        };

        Self::with_resolver(&settings, config, hostname)
    }

    /// Build from already-parsed resolver settings
    pub fn with_resolver(
        settings: &ResolverSettings,
        config: &Config,
        hostname: String,
    ) -> Result<Self> {
        let dns = &config.discovery.dns;

        let servers = settings.server_addrs(dns.port);
        if servers.is_empty() {
            return Err(DiscoveryError::Configuration(format!(
                "no nameservers found in {}",
                dns.resolv_conf.display()
            )));
        }

        let names = settings.name_list(dns.name.trim());
        let transport = Transport::from_use_tcp(dns.use_tcp);

        tracing::info!(
            servers = ?servers,
            names = ?names,
            transport = ?transport,
            hostname = %hostname,
            slots = config.haproxy.slots,
            "DNS discovery configured"
        );

        Ok(Self {
            slots: config.haproxy.slots,
            refresh: dns.refresh,
            servers,
            names,
            hostname,
            client: DnsClient::new(transport, dns.query_timeout),
        })
    }

    /// Override the local hostname used for loopback routing
    #[must_use]
    pub fn with_local_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Names that will be queried on the next lookup
    #[must_use]
    pub fn candidate_names(&self) -> &[String] {
        &self.names
    }

    /// Resolve the current slot table
    ///
    /// Tries every nameserver with every candidate name and stops at the first
    /// successful response. When nothing succeeds the last error is returned.
    pub async fn lookup(&mut self) -> Result<SlotTable> {
        let mut last_error = None;

        for server in self.servers.clone() {
            for name in self.names.clone() {
                let response = match self.client.query_srv(server, &name).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(error = %e, "DNS query failed");
                        last_error = Some(e);
                        continue;
                    }
                };

                if response.truncated() {
                    tracing::warn!(%name, %server, "DNS response was truncated");
                }

                match response.response_code() {
                    ResponseCode::NoError => {}
                    ResponseCode::NXDomain => {
                        tracing::warn!(%name, %server, "NXDOMAIN");
                        last_error = Some(DiscoveryError::NxDomain { name, server });
                        continue;
                    }
                    code => {
                        tracing::warn!(%name, %server, rcode = %code, "Unknown DNS failure");
                        last_error = Some(DiscoveryError::DnsFailure { code: code.into() });
                        continue;
                    }
                }

                // Whichever search-domain permutation worked once keeps working
                if self.names.len() > 1 {
                    tracing::debug!(%name, "Narrowing candidate names");
                    self.names = vec![name];
                }

                return self.slot_table(&response);
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DiscoveryError::Configuration("no nameserver or query name to try".to_string())
        }))
    }

    fn slot_table(&self, response: &Message) -> Result<SlotTable> {
        map_srv_response(
            response.answers(),
            response.additionals(),
            self.slots,
            &self.hostname,
        )
    }

    async fn run(
        mut self,
        snapshots: mpsc::Sender<SlotTable>,
        cancel: CancellationToken,
    ) -> Result<()> {
        // A failed first lookup still publishes an empty table so HAProxy can
        // start; later cycles fill it in.
        let mut hosts = match self.lookup().await {
            Ok(hosts) => hosts,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "First DNS lookup failed, starting with empty slots");
                SlotTable::empty(self.slots)
            }
        };

        if snapshots.send(hosts.clone()).await.is_err() {
            return Ok(());
        }

        let mut timer = interval_at(Instant::now() + self.refresh, self.refresh);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("DNS discovery refresh loop shutting down");
                    return Ok(());
                }
                _ = timer.tick() => {
                    let next = match self.lookup().await {
                        Ok(next) => next,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::debug!(
                                error = %e,
                                "DNS refresh failed, keeping previous slots"
                            );
                            continue;
                        }
                    };

                    if next == hosts {
                        continue;
                    }

                    tracing::info!(
                        occupied = next.occupied(),
                        slots = next.len(),
                        "Slot table changed"
                    );
                    hosts = next;
                    if snapshots.send(hosts.clone()).await.is_err() {
                        tracing::debug!("Snapshot receiver dropped, stopping DNS discovery");
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Discovery for DnsDiscovery {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Dns
    }

    fn start(
        self: Box<Self>,
        snapshots: mpsc::Sender<SlotTable>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn((*self).run(snapshots, cancel))
    }
}

/// Place the peers of an SRV response into a table of `slots` entries
///
/// Every SRV answer must have its A record in the additional section. When
/// they do not line up, fetching the missing addresses would take follow-up
/// queries, which is not implemented; the response is rejected instead.
pub fn map_srv_response(
    answers: &[Record],
    additionals: &[Record],
    slots: usize,
    local_hostname: &str,
) -> Result<SlotTable> {
    let srvs: Vec<_> = answers
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::SRV(srv)) => Some(srv),
            _ => None,
        })
        .collect();

    let mut addresses: HashMap<String, (String, Ipv4Addr)> = HashMap::new();
    for record in additionals {
        if let Some(RData::A(a)) = record.data() {
            let key = record.name().to_lowercase().to_string();
            addresses.insert(key, (record.name().to_string(), a.0));
        }
    }

    if addresses.len() != srvs.len() {
        tracing::error!(
            answers = ?answers,
            additionals = ?additionals,
            "SRV answers and address records do not line up"
        );
        return Err(DiscoveryError::IncompleteAdditional {
            srv_count: srvs.len(),
            a_count: addresses.len(),
        });
    }

    let mut table = SlotTable::empty(slots);

    for srv in srvs {
        let target = srv.target().to_lowercase().to_string();
        let (fqdn, ip) = addresses
            .get(&target)
            .ok_or_else(|| DiscoveryError::MissingAddress {
                target: srv.target().to_string(),
            })?;

        let name = short_hostname(fqdn);
        let Some(index) = slot_from_hostname(name) else {
            tracing::warn!(%fqdn, "Peer hostname has no numeric slot suffix, ignoring");
            continue;
        };

        let ip = if name == local_hostname {
            LOOPBACK.to_string()
        } else {
            ip.to_string()
        };

        let host = Host {
            name: name.to_string(),
            fqdn: fqdn.clone(),
            ip,
            port: srv.port(),
        };

        if !table.set(index, host) {
            tracing::debug!(%fqdn, index, slots, "Peer slot out of range, ignoring");
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::{A, SRV};
    use hickory_proto::rr::Name;

    fn srv(target: &str, port: u16) -> Record {
        Record::from_rdata(
            Name::from_ascii("_peer._tcp.cluster.local.").unwrap(),
            30,
            RData::SRV(SRV::new(0, 0, port, Name::from_ascii(target).unwrap())),
        )
    }

    fn a(name: &str, ip: [u8; 4]) -> Record {
        Record::from_rdata(
            Name::from_ascii(name).unwrap(),
            30,
            RData::A(A(Ipv4Addr::from(ip))),
        )
    }

    #[test]
    fn test_peers_land_in_their_slots() {
        let answers = vec![
            srv("svc-0.cluster.local.", 8080),
            srv("svc-1.cluster.local.", 8081),
        ];
        let additionals = vec![
            a("svc-0.cluster.local.", [10, 0, 0, 1]),
            a("svc-1.cluster.local.", [10, 0, 0, 2]),
        ];

        let table = map_srv_response(&answers, &additionals, 2, "elsewhere").unwrap();
        assert_eq!(
            table.get(0).unwrap(),
            &Host {
                name: "svc-0".to_string(),
                fqdn: "svc-0.cluster.local.".to_string(),
                ip: "10.0.0.1".to_string(),
                port: 8080,
            }
        );
        assert_eq!(table.get(1).unwrap().ip, "10.0.0.2");
        assert_eq!(table.get(1).unwrap().port, 8081);
    }

    #[test]
    fn test_answer_order_does_not_matter() {
        let forward = vec![
            srv("svc-0.cluster.local.", 80),
            srv("svc-2.cluster.local.", 80),
            srv("svc-1.cluster.local.", 80),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        let additionals = vec![
            a("svc-1.cluster.local.", [10, 0, 0, 2]),
            a("svc-0.cluster.local.", [10, 0, 0, 1]),
            a("svc-2.cluster.local.", [10, 0, 0, 3]),
        ];

        let first = map_srv_response(&forward, &additionals, 3, "").unwrap();
        let second = map_srv_response(&reversed, &additionals, 3, "").unwrap();
        assert_eq!(first, second);
        for (index, host) in first.iter() {
            assert_eq!(host.name, format!("svc-{index}"));
        }
    }

    #[test]
    fn test_out_of_range_peer_is_dropped() {
        let answers = vec![
            srv("svc-0.cluster.local.", 80),
            srv("svc-5.cluster.local.", 80),
        ];
        let additionals = vec![
            a("svc-0.cluster.local.", [10, 0, 0, 1]),
            a("svc-5.cluster.local.", [10, 0, 0, 6]),
        ];

        let table = map_srv_response(&answers, &additionals, 2, "").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().ip, "10.0.0.1");
        assert!(table.get(1).unwrap().is_empty());
    }

    #[test]
    fn test_peer_without_slot_suffix_is_dropped() {
        let answers = vec![
            srv("svc-0.cluster.local.", 80),
            srv("svc-canary.cluster.local.", 80),
        ];
        let additionals = vec![
            a("svc-0.cluster.local.", [10, 0, 0, 1]),
            a("svc-canary.cluster.local.", [10, 0, 0, 9]),
        ];

        let table = map_srv_response(&answers, &additionals, 2, "").unwrap();
        assert_eq!(table.occupied(), 1);
        assert_eq!(table.get(0).unwrap().name, "svc-0");
        assert!(table.get(1).unwrap().is_empty());
    }

    #[test]
    fn test_local_peer_routes_to_loopback() {
        let answers = vec![
            srv("svc-0.cluster.local.", 80),
            srv("svc-1.cluster.local.", 80),
        ];
        let additionals = vec![
            a("svc-0.cluster.local.", [10, 0, 0, 1]),
            a("svc-1.cluster.local.", [10, 0, 0, 2]),
        ];

        let table = map_srv_response(&answers, &additionals, 2, "svc-1").unwrap();
        assert_eq!(table.get(0).unwrap().ip, "10.0.0.1");
        assert_eq!(table.get(1).unwrap().ip, LOOPBACK);
        assert_eq!(table.get(1).unwrap().name, "svc-1");
    }

    #[test]
    fn test_target_match_is_case_insensitive() {
        let answers = vec![srv("SVC-0.Cluster.Local.", 80)];
        let additionals = vec![a("svc-0.cluster.local.", [10, 0, 0, 1])];

        let table = map_srv_response(&answers, &additionals, 1, "").unwrap();
        assert_eq!(table.get(0).unwrap().ip, "10.0.0.1");
    }

    #[test]
    fn test_missing_address_records_are_fatal() {
        let answers = vec![srv("svc-0.cluster.local.", 80), srv("svc-1.cluster.local.", 80)];
        let additionals = vec![a("svc-0.cluster.local.", [10, 0, 0, 1])];

        let err = map_srv_response(&answers, &additionals, 2, "").unwrap_err();
        assert!(matches!(err, DiscoveryError::IncompleteAdditional { srv_count: 2, a_count: 1 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_mismatched_targets_are_fatal() {
        let answers = vec![srv("svc-0.cluster.local.", 80)];
        let additionals = vec![a("other-0.cluster.local.", [10, 0, 0, 1])];

        let err = map_srv_response(&answers, &additionals, 1, "").unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingAddress { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_response_gives_empty_table() {
        let table = map_srv_response(&[], &[], 3, "").unwrap();
        assert_eq!(table, SlotTable::empty(3));
    }

    #[test]
    fn test_no_nameservers_is_rejected() {
        let mut config = Config::default();
        config.discovery.method = Some(DiscoveryMethod::Dns);
        config.discovery.dns.name = "_peer._tcp".to_string();

        let result =
            DnsDiscovery::with_resolver(&ResolverSettings::default(), &config, String::new());
        assert!(matches!(result, Err(DiscoveryError::Configuration(_))));
    }

    #[test]
    fn test_name_list_built_from_search() {
        let mut config = Config::default();
        config.discovery.dns.name = "_peer._tcp.cache".to_string();
        let settings = ResolverSettings {
            nameservers: vec!["10.0.0.53".parse().unwrap()],
            search: vec!["ns.svc.cluster.local.".to_string(), "svc.cluster.local.".to_string()],
            ndots: 5,
        };

        let discovery = DnsDiscovery::with_resolver(&settings, &config, String::new()).unwrap();
        assert_eq!(
            discovery.candidate_names(),
            &[
                "_peer._tcp.cache.ns.svc.cluster.local.".to_string(),
                "_peer._tcp.cache.svc.cluster.local.".to_string(),
                "_peer._tcp.cache.".to_string(),
            ]
        );
    }
}
