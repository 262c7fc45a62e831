//! Registry entries and snapshots
//!
//! A [`RegistrySnapshot`] is the full known set at a point in time: at most
//! one [`RegistryEntry`] per [`CanonicalToken`], iterated in token byte order.
//! Published snapshots are never mutated; a merge builds a new one.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::{self, DomainMoment};
use crate::lineage::LineageFragment;
use crate::token::CanonicalToken;

/// Latest known observation of one canonical token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub token: CanonicalToken,
    /// Raw token last accepted for this identity; what listings hand back
    pub source: String,
    pub moment: DomainMoment,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "LineageFragment::is_empty")]
    pub lineage: LineageFragment,
}

impl RegistryEntry {
    /// True if both entries carry the same logical content (moment and fields)
    pub fn same_content(&self, other: &RegistryEntry) -> bool {
        self.moment == other.moment && self.fields == other.fields
    }
}

/// What an upsert did to the in-progress snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No entry existed for the token
    Inserted,
    /// Newer-or-equal moment with different content
    Replaced,
    /// Newer-or-equal moment, identical content; existing entry kept
    Unchanged,
    /// Older moment; existing entry kept
    Stale,
}

impl UpsertOutcome {
    pub fn is_change(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Replaced)
    }
}

/// Immutable mapping from canonical token to its registry entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    entries: BTreeMap<CanonicalToken, RegistryEntry>,
}

impl RegistrySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from entries; `None` if two entries share a token
    pub fn from_entries(entries: impl IntoIterator<Item = RegistryEntry>) -> Option<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if map.insert(entry.token.clone(), entry).is_some() {
                return None;
            }
        }
        Some(Self { entries: map })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: &CanonicalToken) -> Option<&RegistryEntry> {
        self.entries.get(token)
    }

    /// Entries in canonical token order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &RegistryEntry> + '_ {
        self.entries.values()
    }

    /// Newest moment across all entries
    pub fn latest_moment(&self) -> Option<DomainMoment> {
        self.entries.values().map(|e| e.moment).max()
    }

    /// Same tokens with the same moments and fields, ignoring sources and lineage
    pub fn same_content(&self, other: &RegistrySnapshot) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .values()
                .zip(other.entries.values())
                .all(|(a, b)| a.token == b.token && a.same_content(b))
    }

    /// Fold one observation into an in-progress snapshot
    ///
    /// Newer-or-equal moments replace; on equal moments the incoming
    /// record's fields win. Identical content leaves the existing entry.
    pub(crate) fn upsert(&mut self, candidate: RegistryEntry) -> UpsertOutcome {
        match self.entries.get(&candidate.token) {
            None => {
                self.entries.insert(candidate.token.clone(), candidate);
                UpsertOutcome::Inserted
            }
            Some(existing) if !clock::is_newer_or_equal(&candidate.moment, &existing.moment) => {
                UpsertOutcome::Stale
            }
            Some(existing) if existing.same_content(&candidate) => UpsertOutcome::Unchanged,
            Some(_) => {
                self.entries.insert(candidate.token.clone(), candidate);
                UpsertOutcome::Replaced
            }
        }
    }

    /// Keep only the newest `keep` entries; returns how many were dropped
    ///
    /// Newest is by moment descending, ties broken by token ascending.
    pub(crate) fn retain_newest(&mut self, keep: usize) -> usize {
        if self.entries.len() <= keep {
            return 0;
        }

        let mut ranked: Vec<(&CanonicalToken, DomainMoment)> =
            self.entries.iter().map(|(t, e)| (t, e.moment)).collect();
        ranked.sort_by(|a, b| match clock::compare(&b.1, &a.1) {
            Ordering::Equal => a.0.cmp(b.0),
            other => other,
        });

        let dropped: Vec<CanonicalToken> =
            ranked[keep..].iter().map(|(t, _)| (*t).clone()).collect();
        for token in &dropped {
            self.entries.remove(token);
        }
        dropped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenNormalizer;

    fn entry(raw: &str, p: u64, b: u32, s: u32) -> RegistryEntry {
        let token = TokenNormalizer::standard().unwrap().normalize(raw).unwrap();
        RegistryEntry {
            token,
            source: raw.to_string(),
            moment: DomainMoment::new(p, b, s).unwrap(),
            fields: BTreeMap::new(),
            lineage: LineageFragment::empty(),
        }
    }

    #[test]
    fn test_upsert_outcomes() {
        let mut snap = RegistrySnapshot::empty();
        assert_eq!(snap.upsert(entry("https://x/a", 5, 0, 1)), UpsertOutcome::Inserted);
        assert_eq!(snap.upsert(entry("https://x/a", 5, 0, 1)), UpsertOutcome::Unchanged);
        assert_eq!(snap.upsert(entry("https://x/a", 5, 0, 0)), UpsertOutcome::Stale);
        assert_eq!(snap.upsert(entry("https://x/a", 5, 0, 2)), UpsertOutcome::Replaced);
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_equal_moment_new_fields_replace() {
        let mut snap = RegistrySnapshot::empty();
        snap.upsert(entry("https://x/a", 5, 0, 1));

        let mut refreshed = entry("https://x/a/", 5, 0, 1);
        refreshed.fields.insert("chakraDay".into(), "Root".into());
        assert_eq!(snap.upsert(refreshed.clone()), UpsertOutcome::Replaced);

        let stored = snap.get(&refreshed.token).unwrap();
        assert_eq!(stored.fields["chakraDay"], "Root");
        assert_eq!(stored.source, "https://x/a/");
    }

    #[test]
    fn test_unchanged_keeps_existing_source() {
        let mut snap = RegistrySnapshot::empty();
        snap.upsert(entry("https://x/a", 5, 0, 1));
        snap.upsert(entry("HTTPS://X/a/", 5, 0, 1));
        let only = snap.iter().next().unwrap();
        assert_eq!(only.source, "https://x/a");
    }

    #[test]
    fn test_iteration_in_token_order() {
        let mut snap = RegistrySnapshot::empty();
        for name in ["c", "a", "b"] {
            snap.upsert(entry(&format!("https://x/{}", name), 1, 0, 0));
        }
        let tokens: Vec<&str> = snap.iter().skip(1).map(|e| e.token.as_str()).collect();
        assert_eq!(tokens, vec!["https://x/b", "https://x/c"]);
    }

    #[test]
    fn test_retain_newest() {
        let mut snap = RegistrySnapshot::empty();
        snap.upsert(entry("https://x/old", 1, 0, 0));
        snap.upsert(entry("https://x/new", 3, 0, 0));
        snap.upsert(entry("https://x/tie-b", 2, 0, 0));
        snap.upsert(entry("https://x/tie-a", 2, 0, 0));

        assert_eq!(snap.retain_newest(2), 2);
        let kept: Vec<&str> = snap.iter().map(|e| e.token.as_str()).collect();
        assert_eq!(kept, vec!["https://x/new", "https://x/tie-a"]);
        assert_eq!(snap.retain_newest(10), 0);
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        let a = entry("https://x/a", 1, 0, 0);
        assert!(RegistrySnapshot::from_entries(vec![a.clone(), a]).is_none());
    }

    #[test]
    fn test_latest_moment() {
        let mut snap = RegistrySnapshot::empty();
        assert_eq!(snap.latest_moment(), None);
        snap.upsert(entry("https://x/a", 1, 4, 0));
        snap.upsert(entry("https://x/b", 1, 5, 0));
        assert_eq!(snap.latest_moment(), Some(DomainMoment::new(1, 5, 0).unwrap()));
    }
}
