// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Authorization Policies
//!
//! A policy remembers a human decision for an `(origin, action)` pair,
//! optionally narrowed to a set of event kinds. The persisted shape is
//! `host -> "true"|"false" -> type -> {conditions, created_at}`, and
//! [`PolicyBook`] is that map with the lookup and merge rules attached.
//!
//! ## Lookup order
//!
//! 1. a kinds-restricted entry containing the request's kind (allow, then deny)
//! 2. an unconditional entry (allow, then deny)
//! 3. nothing: the broker has to ask
//!
//! ## Writes
//!
//! Writing one decision reconciles the opposite one so that no
//! `(origin, action, kind)` is ever both allowed and denied.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::domain::action::{ActionType, Origin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Decision::Allow => Decision::Deny,
            Decision::Deny => Decision::Allow,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny => f.write_str("deny"),
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" | "accept" | "true" => Ok(Decision::Allow),
            "deny" | "reject" | "false" => Ok(Decision::Deny),
            other => Err(format!("unknown decision '{}', expected allow or deny", other)),
        }
    }
}

/// Refinement of a policy. No kinds means every request of the action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "kinds_as_map",
        deserialize_with = "kinds_from_map"
    )]
    pub kinds: Option<BTreeSet<u32>>,
}

impl Conditions {
    pub fn unconditional() -> Self {
        Self::default()
    }

    pub fn kinds(kinds: impl IntoIterator<Item = u32>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    pub fn is_unconditional(&self) -> bool {
        self.kinds.is_none()
    }

    fn covers_kind(&self, kind: u32) -> bool {
        self.kinds.as_ref().is_some_and(|kinds| kinds.contains(&kind))
    }
}

// Kinds persist as `{"1": true, "7": true}`.
fn kinds_as_map<S: Serializer>(kinds: &Option<BTreeSet<u32>>, serializer: S) -> Result<S::Ok, S::Error> {
    match kinds {
        Some(kinds) => {
            let map: BTreeMap<u32, bool> = kinds.iter().map(|k| (*k, true)).collect();
            map.serialize(serializer)
        }
        None => serializer.serialize_none(),
    }
}

fn kinds_from_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<BTreeSet<u32>>, D::Error> {
    let map: Option<BTreeMap<u32, bool>> = Option::deserialize(deserializer)?;
    Ok(map.map(|m| m.into_iter().filter(|(_, on)| *on).map(|(k, _)| k).collect()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub conditions: Conditions,
    /// Unix seconds.
    pub created_at: i64,
}

/// Both decision buckets for one host, keyed `"true"`/`"false"` on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPolicies {
    #[serde(rename = "true", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allow: BTreeMap<ActionType, PolicyEntry>,
    #[serde(rename = "false", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deny: BTreeMap<ActionType, PolicyEntry>,
}

impl HostPolicies {
    fn bucket(&self, decision: Decision) -> &BTreeMap<ActionType, PolicyEntry> {
        match decision {
            Decision::Allow => &self.allow,
            Decision::Deny => &self.deny,
        }
    }

    fn bucket_mut(&mut self, decision: Decision) -> &mut BTreeMap<ActionType, PolicyEntry> {
        match decision {
            Decision::Allow => &mut self.allow,
            Decision::Deny => &mut self.deny,
        }
    }

    fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Flattened row for listing and auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub host: Origin,
    #[serde(rename = "type")]
    pub action: ActionType,
    pub decision: Decision,
    pub conditions: Conditions,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    pub host: Option<Origin>,
    pub decision: Option<Decision>,
    pub action: Option<ActionType>,
}

impl PolicyFilter {
    fn accepts(&self, host: &Origin, decision: Decision, action: ActionType) -> bool {
        self.host.as_ref().is_none_or(|h| h == host)
            && self.decision.is_none_or(|d| d == decision)
            && self.action.is_none_or(|a| a == action)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyBook {
    hosts: BTreeMap<Origin, HostPolicies>,
}

const DECISION_ORDER: [Decision; 2] = [Decision::Allow, Decision::Deny];

impl PolicyBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decision_for(&self, origin: &Origin, action: ActionType, kind: Option<u32>) -> Option<Decision> {
        let host = self.hosts.get(origin)?;

        if let Some(kind) = kind {
            for decision in DECISION_ORDER {
                if let Some(entry) = host.bucket(decision).get(&action) {
                    if entry.conditions.covers_kind(kind) {
                        return Some(decision);
                    }
                }
            }
        }

        DECISION_ORDER.into_iter().find(|decision| {
            host.bucket(*decision)
                .get(&action)
                .is_some_and(|entry| entry.conditions.is_unconditional())
        })
    }

    pub fn put(&mut self, origin: &Origin, action: ActionType, decision: Decision, conditions: Conditions, now: i64) {
        let host = self.hosts.entry(origin.clone()).or_default();

        // Reconcile the opposite bucket first.
        let opposite = host.bucket_mut(decision.opposite());
        match &conditions.kinds {
            None => {
                if opposite.get(&action).is_some_and(|e| e.conditions.is_unconditional()) {
                    opposite.remove(&action);
                }
            }
            Some(new_kinds) => {
                let mut emptied = false;
                if let Some(entry) = opposite.get_mut(&action) {
                    if let Some(existing) = entry.conditions.kinds.as_mut() {
                        existing.retain(|k| !new_kinds.contains(k));
                        emptied = existing.is_empty();
                    }
                }
                if emptied {
                    opposite.remove(&action);
                }
            }
        }

        let bucket = host.bucket_mut(decision);
        let merged = match (bucket.get(&action).map(|e| &e.conditions.kinds), conditions.kinds) {
            // Already unconditional for this decision: a narrower rule adds nothing.
            (Some(None), Some(_)) => Conditions::unconditional(),
            (Some(Some(existing)), Some(mut new_kinds)) => {
                new_kinds.extend(existing.iter().copied());
                Conditions { kinds: Some(new_kinds) }
            }
            (_, kinds) => Conditions { kinds },
        };

        bucket.insert(
            action,
            PolicyEntry {
                conditions: merged,
                created_at: now,
            },
        );
    }

    /// Removes the entry for `action`, or every entry of `decision` when no
    /// action is given. Returns the number of entries removed.
    pub fn remove_all(&mut self, origin: &Origin, decision: Decision, action: Option<ActionType>) -> usize {
        let Some(host) = self.hosts.get_mut(origin) else {
            return 0;
        };

        let bucket = host.bucket_mut(decision);
        let removed = match action {
            Some(action) => usize::from(bucket.remove(&action).is_some()),
            None => {
                let n = bucket.len();
                bucket.clear();
                n
            }
        };

        if host.is_empty() {
            self.hosts.remove(origin);
        }
        removed
    }

    pub fn records(&self, filter: &PolicyFilter) -> Vec<PolicyRecord> {
        let mut out = Vec::new();
        for (host, policies) in &self.hosts {
            for decision in DECISION_ORDER {
                for (action, entry) in policies.bucket(decision) {
                    if filter.accepts(host, decision, *action) {
                        out.push(PolicyRecord {
                            host: host.clone(),
                            action: *action,
                            decision,
                            conditions: entry.conditions.clone(),
                            created_at: entry.created_at,
                        });
                    }
                }
            }
        }
        out.sort_by(|a, b| (&a.host, a.action, a.decision).cmp(&(&b.host, b.action, b.decision)));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::new("example.com")
    }

    #[test]
    fn unknown_without_any_policy() {
        let book = PolicyBook::new();
        assert_eq!(book.decision_for(&origin(), ActionType::GetPublicKey, None), None);
    }

    #[test]
    fn unconditional_allow_applies_to_every_kind() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::SignEvent, Decision::Allow, Conditions::unconditional(), 1);
        assert_eq!(book.decision_for(&origin(), ActionType::SignEvent, Some(1)), Some(Decision::Allow));
        assert_eq!(book.decision_for(&origin(), ActionType::SignEvent, Some(30023)), Some(Decision::Allow));
        assert_eq!(book.decision_for(&Origin::new("Example.com"), ActionType::SignEvent, Some(1)), None);
    }

    #[test]
    fn conditional_match_wins_over_unconditional() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::SignEvent, Decision::Deny, Conditions::unconditional(), 1);
        book.put(&origin(), ActionType::SignEvent, Decision::Allow, Conditions::kinds([1, 7]), 2);

        assert_eq!(book.decision_for(&origin(), ActionType::SignEvent, Some(7)), Some(Decision::Allow));
        assert_eq!(book.decision_for(&origin(), ActionType::SignEvent, Some(4)), Some(Decision::Deny));
        assert_eq!(book.decision_for(&origin(), ActionType::SignEvent, None), Some(Decision::Deny));
    }

    #[test]
    fn kinds_merge_within_one_decision() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::SignEvent, Decision::Allow, Conditions::kinds([1]), 1);
        book.put(&origin(), ActionType::SignEvent, Decision::Allow, Conditions::kinds([7]), 2);

        let records = book.records(&PolicyFilter::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].conditions, Conditions::kinds([1, 7]));
        assert_eq!(records[0].created_at, 2);
    }

    #[test]
    fn opposite_decision_is_reconciled() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::SignEvent, Decision::Deny, Conditions::kinds([1, 4]), 1);
        book.put(&origin(), ActionType::SignEvent, Decision::Allow, Conditions::kinds([1]), 2);

        assert_eq!(book.decision_for(&origin(), ActionType::SignEvent, Some(1)), Some(Decision::Allow));
        assert_eq!(book.decision_for(&origin(), ActionType::SignEvent, Some(4)), Some(Decision::Deny));

        book.put(&origin(), ActionType::SignEvent, Decision::Allow, Conditions::kinds([4]), 3);
        let denies = book.records(&PolicyFilter {
            decision: Some(Decision::Deny),
            ..Default::default()
        });
        assert!(denies.is_empty());
    }

    #[test]
    fn unconditional_write_replaces_opposite_unconditional() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::GetPublicKey, Decision::Deny, Conditions::unconditional(), 1);
        book.put(&origin(), ActionType::GetPublicKey, Decision::Allow, Conditions::unconditional(), 2);
        assert_eq!(book.decision_for(&origin(), ActionType::GetPublicKey, None), Some(Decision::Allow));
        assert_eq!(book.records(&PolicyFilter::default()).len(), 1);
    }

    #[test]
    fn remove_all_prunes_empty_hosts() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::GetPublicKey, Decision::Allow, Conditions::unconditional(), 1);
        book.put(&origin(), ActionType::GetRelays, Decision::Allow, Conditions::unconditional(), 1);
        book.put(&origin(), ActionType::SignEvent, Decision::Deny, Conditions::unconditional(), 1);

        assert_eq!(book.remove_all(&origin(), Decision::Allow, None), 2);
        assert!(!book.is_empty());
        assert_eq!(book.remove_all(&origin(), Decision::Deny, Some(ActionType::SignEvent)), 1);
        assert!(book.is_empty());
        assert_eq!(book.remove_all(&origin(), Decision::Deny, None), 0);
    }

    #[test]
    fn persisted_shape_is_host_decision_type() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::SignEvent, Decision::Allow, Conditions::kinds([1]), 1700000000);
        book.put(&origin(), ActionType::GetPublicKey, Decision::Deny, Conditions::unconditional(), 1700000001);

        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["example.com"]["true"]["signEvent"]["conditions"]["kinds"]["1"], true);
        assert_eq!(json["example.com"]["false"]["getPublicKey"]["conditions"], serde_json::json!({}));
        assert_eq!(json["example.com"]["false"]["getPublicKey"]["created_at"], 1700000001);

        let back: PolicyBook = serde_json::from_value(json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn records_filter_by_host_and_action() {
        let mut book = PolicyBook::new();
        book.put(&origin(), ActionType::GetPublicKey, Decision::Allow, Conditions::unconditional(), 1);
        book.put(&Origin::new("other.org"), ActionType::GetPublicKey, Decision::Allow, Conditions::unconditional(), 1);
        book.put(&origin(), ActionType::GetRelays, Decision::Allow, Conditions::unconditional(), 1);

        let rows = book.records(&PolicyFilter {
            host: Some(origin()),
            action: Some(ActionType::GetPublicKey),
            ..Default::default()
        });
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].host, origin());
    }
}
