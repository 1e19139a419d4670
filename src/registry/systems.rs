//! Known LAN hosts: the gateway and every poisoning target.

use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;
use pnet::util::MacAddr;

/// One LAN host the router forwards traffic to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSystem {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub ip_string: String,
    pub mac_string: String,
}

impl TargetSystem {
    pub fn new(mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self {
            mac,
            ip,
            ip_string: ip.to_string(),
            mac_string: mac.to_string(),
        }
    }
}

/// Ordered table of target systems, keyed by IP.
///
/// Cloning shares the underlying table, so hosts discovered at runtime can
/// be added while the forwarding thread reads it.
#[derive(Debug, Clone, Default)]
pub struct TargetSystemRegistry {
    entries: Arc<Mutex<Vec<TargetSystem>>>,
}

impl TargetSystemRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host, replacing any existing entry with the same IP in place.
    ///
    /// Returns `true` when the host was not known before.
    pub fn insert(&self, mac: MacAddr, ip: Ipv4Addr) -> bool {
        let system = TargetSystem::new(mac, ip);
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.iter_mut().find(|entry| entry.ip == ip) {
            *existing = system;
            false
        } else {
            entries.push(system);
            true
        }
    }

    /// First host with the given IP.
    pub fn find_by_ip(&self, ip: Ipv4Addr) -> Option<TargetSystem> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.ip == ip)
            .cloned()
    }

    /// MAC of the host with the given IP, without cloning the entry.
    pub fn mac_for(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.ip == ip)
            .map(|entry| entry.mac)
    }

    /// Visit every host in insertion order.
    pub fn for_each(&self, mut visitor: impl FnMut(&TargetSystem)) {
        for entry in self.entries.lock().iter() {
            visitor(entry);
        }
    }

    /// Number of entries in the registry.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, last)
    }

    #[test]
    fn should_store_and_find_systems_by_ip() {
        let registry = TargetSystemRegistry::new();
        registry.insert(mac(1), Ipv4Addr::new(10, 0, 0, 1));
        registry.insert(mac(2), Ipv4Addr::new(10, 0, 0, 50));

        let found = registry.find_by_ip(Ipv4Addr::new(10, 0, 0, 50)).unwrap();
        assert_eq!(found.mac, mac(2));
        assert_eq!(found.ip_string, "10.0.0.50");
        assert_eq!(found.mac_string, "aa:bb:cc:dd:ee:02");
        assert!(registry.find_by_ip(Ipv4Addr::new(10, 0, 0, 99)).is_none());
    }

    #[test]
    fn should_replace_duplicate_ip_in_place() {
        let registry = TargetSystemRegistry::new();
        assert!(registry.insert(mac(1), Ipv4Addr::new(10, 0, 0, 1)));
        assert!(registry.insert(mac(2), Ipv4Addr::new(10, 0, 0, 2)));
        assert!(!registry.insert(mac(9), Ipv4Addr::new(10, 0, 0, 1)));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.mac_for(Ipv4Addr::new(10, 0, 0, 1)), Some(mac(9)));

        let mut order = Vec::new();
        registry.for_each(|system| order.push(system.ip));
        assert_eq!(
            order,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[test]
    fn should_share_entries_between_clones() {
        let registry = TargetSystemRegistry::new();
        let reader = registry.clone();
        assert!(reader.is_empty());

        registry.insert(mac(7), Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(reader.mac_for(Ipv4Addr::new(10, 0, 0, 7)), Some(mac(7)));
    }

    #[test]
    fn should_accept_inserts_while_another_thread_reads() {
        let registry = TargetSystemRegistry::new();
        let reader = registry.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..200u8 {
                let _ = reader.find_by_ip(Ipv4Addr::new(10, 0, 1, i));
            }
        });
        for i in 0..200u8 {
            registry.insert(mac(i), Ipv4Addr::new(10, 0, 1, i));
        }
        handle.join().unwrap();

        assert_eq!(registry.len(), 200);
    }
}
