//! In-memory table of live game servers.

use log::{debug, info};
use shared::ServerRecord;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracking id built from the digits of `ip` followed by those of `port`.
pub fn server_id(ip: &str, port: &str) -> u64 {
    ip.chars()
        .chain(port.chars())
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |id, digit| id.wrapping_mul(10).wrapping_add(digit as u64))
}

#[derive(Debug)]
struct Entry {
    id: u64,
    record: ServerRecord,
    last_seen: Instant,
}

/// Servers keyed by address. A server that neither registers nor checks in
/// for two check-in periods is dropped.
#[derive(Debug)]
pub struct Registry {
    servers: HashMap<(String, String), Entry>,
    check_in_frequency: Duration,
}

impl Registry {
    pub fn new(check_in_frequency: Duration) -> Self {
        Self {
            servers: HashMap::new(),
            check_in_frequency,
        }
    }

    pub fn check_in_frequency(&self) -> Duration {
        self.check_in_frequency
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Inserts or replaces the server at the record's address. Records
    /// without a name or port are refused.
    pub fn register(&mut self, record: ServerRecord, now: Instant) -> bool {
        if record.is_empty() || record.ip.is_empty() {
            return false;
        }
        let id = server_id(&record.ip, &record.port);
        info!(
            "Registered {} ({}) on {}:{}",
            record.name, id, record.ip, record.port
        );
        self.servers.insert(
            (record.ip.clone(), record.port.clone()),
            Entry {
                id,
                record,
                last_seen: now,
            },
        );
        true
    }

    /// Refreshes a known server and takes over its mutable fields. Unknown
    /// servers are left alone.
    pub fn check_in(&mut self, record: ServerRecord, now: Instant) -> bool {
        let key = (record.ip.clone(), record.port.clone());
        match self.servers.get_mut(&key) {
            Some(entry) => {
                debug!("Check-in from {} ({})", record.name, entry.id);
                entry.last_seen = now;
                entry.record.name = record.name;
                entry.record.game_mode = record.game_mode;
                entry.record.map = record.map;
                entry.record.max_players = record.max_players;
                entry.record.current_players = record.current_players;
                true
            }
            None => false,
        }
    }

    pub fn unregister(&mut self, record: &ServerRecord) -> bool {
        let key = (record.ip.clone(), record.port.clone());
        match self.servers.remove(&key) {
            Some(entry) => {
                info!(
                    "De-registered {} on {}:{}",
                    entry.record.name, entry.record.ip, entry.record.port
                );
                true
            }
            None => false,
        }
    }

    /// Drops servers last seen more than two check-in periods before `now`.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let limit = self.check_in_frequency.saturating_mul(2);
        let before = self.servers.len();
        self.servers
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= limit);
        let purged = before - self.servers.len();
        if purged > 0 {
            info!("Expired {} server(s)", purged);
        }
        purged
    }

    /// Live servers ordered by id.
    pub fn servers(&self) -> Vec<ServerRecord> {
        let mut entries: Vec<&Entry> = self.servers.values().collect();
        entries.sort_by_key(|entry| entry.id);
        entries.into_iter().map(|entry| entry.record.clone()).collect()
    }
}
