// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPolicy {
    pub read: bool,
    pub write: bool,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self { read: true, write: true }
    }
}

/// Preferred relays, `url -> {read, write}`. Returned verbatim by `getRelays`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayList(BTreeMap<String, RelayPolicy>);

impl RelayList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a relay. Blank URLs are ignored; returns whether
    /// the list changed.
    pub fn upsert(&mut self, url: &str, policy: RelayPolicy) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        self.0.insert(url.to_string(), policy) != Some(policy)
    }

    pub fn remove(&mut self, url: &str) -> bool {
        self.0.remove(url.trim()).is_some()
    }

    pub fn get(&self, url: &str) -> Option<RelayPolicy> {
        self.0.get(url.trim()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelayPolicy)> {
        self.0.iter().map(|(url, policy)| (url.as_str(), policy))
    }

    /// Up to `limit` write-enabled relays, for embedding in shareable
    /// profile identifiers.
    pub fn write_relays(&self, limit: usize) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, policy)| policy.write)
            .map(|(url, _)| url.clone())
            .take(limit)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_trims_and_rejects_blank() {
        let mut relays = RelayList::new();
        assert!(relays.upsert("  wss://relay.damus.io ", RelayPolicy::default()));
        assert!(!relays.upsert("   ", RelayPolicy::default()));
        assert!(relays.get("wss://relay.damus.io").is_some());
        assert_eq!(relays.len(), 1);
    }

    #[test]
    fn write_relays_skip_read_only() {
        let mut relays = RelayList::new();
        relays.upsert("wss://a", RelayPolicy { read: true, write: false });
        relays.upsert("wss://b", RelayPolicy::default());
        relays.upsert("wss://c", RelayPolicy::default());
        relays.upsert("wss://d", RelayPolicy::default());
        relays.upsert("wss://e", RelayPolicy::default());
        assert_eq!(relays.write_relays(3), vec!["wss://b", "wss://c", "wss://d"]);
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut relays = RelayList::new();
        relays.upsert("wss://nos.lol", RelayPolicy { read: true, write: false });
        let json = serde_json::to_value(&relays).unwrap();
        assert_eq!(json, serde_json::json!({"wss://nos.lol": {"read": true, "write": false}}));
    }
}
