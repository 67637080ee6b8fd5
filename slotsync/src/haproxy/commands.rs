//! Runtime API commands describing slot state
//!
//! Every batch covers all slots, so applying the same batch twice leaves
//! HAProxy in the same state as applying it once, and a lost batch is repaired
//! by the next one.

use slotsync_discovery::{Host, SlotTable};

/// `listen` section holding the templated servers
pub const BACKEND: &str = "upstream";
/// Name prefix of the servers generated by `server-template`
pub const SERVER_PREFIX: &str = "be";
/// No-op command used to check that the runtime socket answers
pub const READY_CHECK: &str = "help";

/// Commands for one slot, each terminated by `;`
#[must_use]
pub fn slot_commands(index: usize, host: &Host) -> String {
    let server = format!("{BACKEND}/{SERVER_PREFIX}{index}");
    if host.is_empty() {
        // Down nodes are kept in maintenance
        format!("set server {server} state maint;")
    } else {
        format!(
            "set server {server} addr {} port {};set server {server} state ready;",
            host.ip, host.port
        )
    }
}

/// One transaction describing every slot in `0..slots`
///
/// Slots missing from `table` are treated as empty.
#[must_use]
pub fn slot_batch(table: &SlotTable, slots: usize) -> String {
    let empty = Host::default();
    let mut batch = String::new();
    for index in 0..slots {
        let host = table.get(index).unwrap_or(&empty);
        batch.push_str(&slot_commands(index, host));
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, ip: &str, port: u16) -> Host {
        Host {
            name: name.to_string(),
            fqdn: format!("{name}.peers."),
            ip: ip.to_string(),
            port,
        }
    }

    #[test]
    fn test_empty_slot_goes_to_maintenance() {
        assert_eq!(
            slot_commands(3, &Host::default()),
            "set server upstream/be3 state maint;"
        );
    }

    #[test]
    fn test_filled_slot_sets_address_then_ready() {
        assert_eq!(
            slot_commands(0, &host("svc-0", "10.0.0.1", 8080)),
            "set server upstream/be0 addr 10.0.0.1 port 8080;set server upstream/be0 state ready;"
        );
    }

    #[test]
    fn test_batch_covers_all_slots() {
        let table = SlotTable::from(vec![
            host("svc-0", "10.0.0.1", 8080),
            host("svc-1", "10.0.0.2", 8080),
        ]);
        assert_eq!(
            slot_batch(&table, 2),
            "set server upstream/be0 addr 10.0.0.1 port 8080;set server upstream/be0 state ready;\
             set server upstream/be1 addr 10.0.0.2 port 8080;set server upstream/be1 state ready;"
        );
    }

    #[test]
    fn test_batch_after_peer_leaves() {
        let mut table = SlotTable::empty(2);
        table.set(0, host("svc-0", "10.0.0.1", 8080));

        let batch = slot_batch(&table, 2);
        assert!(batch.starts_with(
            "set server upstream/be0 addr 10.0.0.1 port 8080;set server upstream/be0 state ready;"
        ));
        assert!(batch.ends_with("set server upstream/be1 state maint;"));
    }

    #[test]
    fn test_short_table_is_padded_with_maintenance() {
        let batch = slot_batch(&SlotTable::empty(0), 2);
        assert_eq!(
            batch,
            "set server upstream/be0 state maint;set server upstream/be1 state maint;"
        );
    }

    #[test]
    fn test_batch_is_deterministic() {
        let mut table = SlotTable::empty(3);
        table.set(2, host("svc-2", "10.0.0.3", 9000));
        assert_eq!(slot_batch(&table, 3), slot_batch(&table.clone(), 3));
    }
}
