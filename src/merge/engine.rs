//! Merge engine
//!
//! Folds a batch of raw records into a snapshot. The engine is pure: it
//! never touches storage and never mutates the snapshot it is given.
//!
//! Rules, in processing order:
//! 1. Records are validated one at a time; failures are collected, not fatal
//! 2. A valid record for an unknown token is inserted
//! 3. A valid record replaces the existing entry when its moment is newer
//!    or equal; on equal moments the later record's fields win
//! 4. Older records are accepted but leave the entry alone
//!
//! `changed` is true only if the resulting logical content differs from the
//! input snapshot, so an idempotent re-send never triggers a commit.

use crate::clock::MomentError;
use crate::lineage::LineageExtractor;
use crate::registry::{RegistryEntry, RegistrySnapshot};
use crate::token::{extract_payload, TokenNormalizer};

use super::errors::{MergeError, RecordError};
use super::record::{RawRecord, ValidatedRecord};

/// Default cap on records per batch
pub const DEFAULT_MAX_BATCH_RECORDS: usize = 10_000;

/// A record that failed validation, with its position in the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub index: usize,
    pub record: RawRecord,
    pub error: RecordError,
}

/// Outcome of merging one batch
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub next: RegistrySnapshot,
    pub changed: bool,
    /// Records that passed validation
    pub accepted: usize,
    /// Accepted records that inserted or replaced an entry
    pub applied: usize,
    pub rejected: Vec<Rejection>,
}

/// Validates records and folds them into snapshots
#[derive(Debug, Clone)]
pub struct MergeEngine {
    normalizer: TokenNormalizer,
    lineage: LineageExtractor,
    max_batch_records: usize,
}

impl MergeEngine {
    pub fn new(normalizer: TokenNormalizer, max_lineage_refs: usize, max_batch_records: usize) -> Self {
        let lineage = LineageExtractor::new(normalizer.clone(), max_lineage_refs);
        Self {
            normalizer,
            lineage,
            max_batch_records,
        }
    }

    pub fn normalizer(&self) -> &TokenNormalizer {
        &self.normalizer
    }

    pub fn max_batch_records(&self) -> usize {
        self.max_batch_records
    }

    /// Validate one record without merging it
    ///
    /// Payload fields form the base; explicit fields override them. The
    /// payload moment is used only when the record has none.
    pub fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, RecordError> {
        let token = self.normalizer.normalize(&record.token)?;
        let lineage = self.lineage.extract(&record.token)?;
        let payload = self
            .normalizer
            .resolve(&record.token)
            .ok()
            .and_then(|url| extract_payload(&url));

        let moment = match (record.moment, &payload) {
            (Some(explicit), _) => explicit.to_moment()?,
            (None, Some(p)) => p.moment()?,
            (None, None) => return Err(MomentError::Missing { field: "moment" }.into()),
        };

        let mut fields = payload.map(|p| p.fields).unwrap_or_default();
        for (k, v) in &record.fields {
            if !k.is_empty() {
                fields.insert(k.clone(), v.clone());
            }
        }

        Ok(ValidatedRecord {
            token,
            source: record.token.clone(),
            moment,
            fields,
            lineage,
        })
    }

    /// Merge a batch into `current`, producing the next snapshot
    pub fn merge(
        &self,
        current: &RegistrySnapshot,
        batch: Vec<RawRecord>,
    ) -> Result<MergeResult, MergeError> {
        if batch.len() > self.max_batch_records {
            return Err(MergeError::BatchTooLarge {
                count: batch.len(),
                max: self.max_batch_records,
            });
        }

        let mut next = current.clone();
        let mut accepted = 0;
        let mut applied = 0;
        let mut rejected = Vec::new();

        for (index, record) in batch.into_iter().enumerate() {
            match self.validate(&record) {
                Ok(valid) => {
                    accepted += 1;
                    if next.upsert(valid.into()).is_change() {
                        applied += 1;
                    }
                }
                Err(error) => rejected.push(Rejection {
                    index,
                    record,
                    error,
                }),
            }
        }

        // Replacements within one batch can cancel out.
        let changed = applied > 0 && !next.same_content(current);
        if !changed {
            next = current.clone();
        }

        Ok(MergeResult {
            next,
            changed,
            accepted,
            applied,
            rejected,
        })
    }
}

impl From<ValidatedRecord> for RegistryEntry {
    fn from(v: ValidatedRecord) -> Self {
        RegistryEntry {
            token: v.token,
            source: v.source,
            moment: v.moment,
            fields: v.fields,
            lineage: v.lineage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DomainMoment;
    use crate::lineage::DEFAULT_MAX_LINEAGE_REFS;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    fn engine() -> MergeEngine {
        MergeEngine::new(
            TokenNormalizer::standard().unwrap(),
            DEFAULT_MAX_LINEAGE_REFS,
            DEFAULT_MAX_BATCH_RECORDS,
        )
    }

    fn payload_token(v: serde_json::Value) -> String {
        format!(
            "https://x/stream/p/{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&v).unwrap())
        )
    }

    #[test]
    fn test_insert_into_empty() {
        let result = engine()
            .merge(&RegistrySnapshot::empty(), vec![RawRecord::at("https://x/s/a?p=1", 9615429, 26, 8)])
            .unwrap();
        assert!(result.changed);
        assert_eq!(result.accepted, 1);
        assert_eq!(result.applied, 1);
        assert_eq!(result.next.len(), 1);
    }

    #[test]
    fn test_resend_is_unchanged() {
        let e = engine();
        let batch = vec![RawRecord::at("https://x/s/a?p=1", 9615429, 26, 8)];
        let first = e.merge(&RegistrySnapshot::empty(), batch.clone()).unwrap();
        let second = e.merge(&first.next, batch).unwrap();
        assert!(!second.changed);
        assert_eq!(second.accepted, 1);
        assert_eq!(second.applied, 0);
        assert_eq!(second.next, first.next);
    }

    #[test]
    fn test_older_record_is_accepted_but_ignored() {
        let e = engine();
        let first = e
            .merge(&RegistrySnapshot::empty(), vec![RawRecord::at("https://x/s/a", 9615429, 26, 8)])
            .unwrap();
        let stale = e
            .merge(&first.next, vec![RawRecord::at("https://x/s/a", 9615429, 26, 7)])
            .unwrap();
        assert!(!stale.changed);
        assert_eq!(stale.accepted, 1);
        assert!(stale.rejected.is_empty());
    }

    #[test]
    fn test_equal_moment_later_record_wins() {
        let batch = vec![
            RawRecord::at("https://x/s/a", 1, 0, 0).with_field("chakraDay", "Root"),
            RawRecord::at("https://x/s/a/", 1, 0, 0).with_field("chakraDay", "Crown"),
        ];
        let result = engine().merge(&RegistrySnapshot::empty(), batch).unwrap();
        let entry = result.next.iter().next().unwrap();
        assert_eq!(entry.fields["chakraDay"], "Crown");
    }

    #[test]
    fn test_cancelling_replacements_are_unchanged() {
        let e = engine();
        let base = e
            .merge(
                &RegistrySnapshot::empty(),
                vec![RawRecord::at("https://x/s/a", 1, 0, 0).with_field("k", "x")],
            )
            .unwrap()
            .next;

        let flip = vec![
            RawRecord::at("https://x/s/a", 1, 0, 0).with_field("k", "y"),
            RawRecord::at("https://x/s/a/", 1, 0, 0).with_field("k", "x"),
        ];
        let result = e.merge(&base, flip).unwrap();
        assert_eq!(result.applied, 2);
        assert!(!result.changed);
        assert_eq!(result.next, base);
    }

    #[test]
    fn test_invalid_records_are_collected() {
        let batch = vec![
            RawRecord::at("", 1, 0, 0),
            RawRecord::at("https://x/s/ok", 1, 0, 0),
            RawRecord::at("https://x/s/bad", 1, 99, 0),
            RawRecord::new("https://x/s/no-moment"),
        ];
        let result = engine().merge(&RegistrySnapshot::empty(), batch).unwrap();

        assert_eq!(result.accepted, 1);
        let codes: Vec<(usize, &str)> =
            result.rejected.iter().map(|r| (r.index, r.error.code())).collect();
        assert_eq!(
            codes,
            vec![(0, "INVALID_TOKEN"), (2, "INVALID_MOMENT"), (3, "INVALID_MOMENT")]
        );
    }

    #[test]
    fn test_batch_too_large() {
        let e = MergeEngine::new(TokenNormalizer::standard().unwrap(), 8, 2);
        let batch = vec![RawRecord::at("https://x/1", 1, 0, 0); 3];
        assert_eq!(
            e.merge(&RegistrySnapshot::empty(), batch).unwrap_err(),
            MergeError::BatchTooLarge { count: 3, max: 2 }
        );
    }

    #[test]
    fn test_payload_supplies_moment_and_fields() {
        let token = payload_token(serde_json::json!({"u": 42, "b": 3, "s": 4, "c": "Heart"}));
        let valid = engine()
            .validate(&RawRecord::new(token).with_field("chakraDay", "Throat"))
            .unwrap();
        assert_eq!(valid.moment, DomainMoment::new(42, 3, 4).unwrap());
        assert_eq!(valid.fields["chakraDay"], "Throat");
    }

    #[test]
    fn test_explicit_moment_beats_payload() {
        let token = payload_token(serde_json::json!({"pulse": 42}));
        let valid = engine().validate(&RawRecord::at(token, 7, 0, 0)).unwrap();
        assert_eq!(valid.moment.pulse(), 7);
    }

    #[test]
    fn test_input_snapshot_untouched() {
        let e = engine();
        let base = e
            .merge(&RegistrySnapshot::empty(), vec![RawRecord::at("https://x/a", 1, 0, 0)])
            .unwrap()
            .next;
        let before = base.clone();
        let _ = e.merge(&base, vec![RawRecord::at("https://x/b", 1, 0, 0)]).unwrap();
        assert_eq!(base, before);
    }
}
