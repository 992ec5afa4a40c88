//! In-memory device registry keyed by client IP

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

/// One observed device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub ip: IpAddr,
    pub mac: String,
    pub user_agent: Option<String>,
    /// Time of the most recent visit
    pub last_seen: DateTime<Local>,
    /// Time of the first visit, kept across overwrites
    pub first_seen: DateTime<Local>,
    pub visits: u64,
}

/// Thread-safe map of IP address to the latest record for that address.
///
/// Writes for the same IP are serialized by the lock; the last write wins.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<IpAddr, DeviceRecord>>,
    max_entries: Option<usize>,
}

impl DeviceRegistry {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Record a visit, overwriting the previous MAC and user agent for `ip`.
    pub fn record_visit(
        &self,
        ip: IpAddr,
        mac: String,
        user_agent: Option<String>,
        now: DateTime<Local>,
    ) -> DeviceRecord {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);

        if !devices.contains_key(&ip) {
            if let Some(max) = self.max_entries {
                evict_oldest(&mut devices, max);
            }
        }

        let record = devices
            .entry(ip)
            .and_modify(|existing| {
                existing.mac.clone_from(&mac);
                existing.user_agent.clone_from(&user_agent);
                existing.last_seen = now;
                existing.visits += 1;
            })
            .or_insert_with(|| DeviceRecord {
                ip,
                mac,
                user_agent,
                last_seen: now,
                first_seen: now,
                visits: 1,
            });

        record.clone()
    }

    pub fn get(&self, ip: &IpAddr) -> Option<DeviceRecord> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ip)
            .cloned()
    }

    /// All records, ordered by IP address
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by_key(|r| r.ip);
        records
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop least recently seen entries until there is room for one more
fn evict_oldest(devices: &mut HashMap<IpAddr, DeviceRecord>, max: usize) {
    while !devices.is_empty() && devices.len() >= max {
        let Some(oldest) = devices
            .values()
            .min_by_key(|r| r.last_seen)
            .map(|r| r.ip)
        else {
            break;
        };
        devices.remove(&oldest);
    }
}
