//! Seal Determinism Tests
//!
//! The seal depends only on the set of (token, moment, fields) triples:
//! never on insertion order, batch boundaries or which raw spelling of a
//! token was seen first.

use std::collections::HashSet;

use sigil_registry::lineage::DEFAULT_MAX_LINEAGE_REFS;
use sigil_registry::merge::{MergeEngine, RawRecord};
use sigil_registry::registry::{seal, RegistrySnapshot, Seal, EMPTY_SEAL_HEX};
use sigil_registry::token::TokenNormalizer;

fn engine() -> MergeEngine {
    MergeEngine::new(
        TokenNormalizer::standard().expect("standard normalizer"),
        DEFAULT_MAX_LINEAGE_REFS,
        1_000,
    )
}

fn records() -> Vec<RawRecord> {
    (0..25)
        .map(|i| {
            RawRecord::at(format!("https://x/s/{:02}", i), 1_000 + i, i % 36, i % 44)
                .with_field("ark", format!("ark-{}", i % 6))
        })
        .collect()
}

fn seal_of(batches: Vec<Vec<RawRecord>>) -> Seal {
    let e = engine();
    let snapshot = batches.into_iter().fold(RegistrySnapshot::empty(), |s, batch| {
        e.merge(&s, batch).unwrap().next
    });
    seal(&snapshot)
}

#[test]
fn test_empty_seal_is_fixed() {
    assert_eq!(seal(&RegistrySnapshot::empty()).to_hex(), EMPTY_SEAL_HEX);
    assert_eq!(EMPTY_SEAL_HEX.len(), 64);
}

#[test]
fn test_seal_ignores_insertion_order() {
    let forward = records();
    let mut reversed = records();
    reversed.reverse();
    let mut interleaved: Vec<RawRecord> = forward.iter().step_by(2).cloned().collect();
    interleaved.extend(forward.iter().skip(1).step_by(2).cloned());

    let expected = seal_of(vec![forward.clone()]);
    assert_eq!(seal_of(vec![reversed]), expected);
    assert_eq!(seal_of(vec![interleaved]), expected);
}

#[test]
fn test_seal_ignores_batch_boundaries() {
    let all = records();
    let split: Vec<Vec<RawRecord>> = all.chunks(4).map(|c| c.to_vec()).collect();
    assert_eq!(seal_of(split), seal_of(vec![all]));
}

#[test]
fn test_seal_ignores_raw_spelling() {
    let a = seal_of(vec![vec![RawRecord::at("https://x/s/a?p=1&q=2", 1, 0, 0)]]);
    let b = seal_of(vec![vec![RawRecord::at("https://x/s/a/?q=2&p=1&utm_medium=x", 1, 0, 0)]]);
    assert_eq!(a, b);
}

#[test]
fn test_new_content_always_changes_seal() {
    let e = engine();
    let mut snapshot = RegistrySnapshot::empty();
    let mut seen: HashSet<Seal> = HashSet::new();
    seen.insert(seal(&snapshot));

    for record in records() {
        let result = e.merge(&snapshot, vec![record]).unwrap();
        assert!(result.changed);
        snapshot = result.next;
        assert!(seen.insert(seal(&snapshot)), "seal repeated after new content");
    }
}

#[test]
fn test_field_change_changes_seal() {
    let base = seal_of(vec![vec![RawRecord::at("https://x/s/a", 1, 0, 0).with_field("k", "v")]]);
    let other = seal_of(vec![vec![RawRecord::at("https://x/s/a", 1, 0, 0).with_field("k", "w")]]);
    assert_ne!(base, other);
}

#[test]
fn test_seal_hex_round_trips_through_display() {
    let s = seal_of(vec![records()]);
    let parsed: Seal = s.to_hex().parse().unwrap();
    assert_eq!(parsed, s);
    assert_eq!(s.etag(), format!("\"{}\"", s.to_hex()));
}
