use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Runtime overrides keyed by policy path, applied in path order on top of the loaded base.
#[derive(Clone, Debug, Default)]
pub struct RuntimeOverrideStore {
    entries: BTreeMap<String, OverrideEntry>,
}

#[derive(Clone, Debug)]
struct OverrideEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl OverrideEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires| expires > now)
    }
}

impl RuntimeOverrideStore {
    pub fn insert(&mut self, path: String, value: Value, ttl: Option<Duration>) {
        let expires_at = ttl.map(|dur| Instant::now() + dur);
        self.entries.insert(path, OverrideEntry { value, expires_at });
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops expired entries and returns the rest.
    pub fn active_entries(&mut self) -> Vec<(String, Value)> {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
        self.entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.value.clone()))
            .collect()
    }
}
