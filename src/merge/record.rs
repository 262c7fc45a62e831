//! Inbound records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::{DomainMoment, MomentError};
use crate::lineage::LineageFragment;
use crate::token::CanonicalToken;

/// A record as submitted by a client, before any validation
///
/// `moment` may be omitted when the token embeds its own payload. Values are
/// kept signed so negative input is reported rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "url")]
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moment: Option<MomentInput>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// Unvalidated moment coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentInput {
    pub pulse: i64,
    pub beat: i64,
    #[serde(rename = "stepIndex", alias = "step_index")]
    pub step_index: i64,
}

impl MomentInput {
    pub fn to_moment(self) -> Result<DomainMoment, MomentError> {
        DomainMoment::from_parts(self.pulse, self.beat, self.step_index)
    }
}

impl From<DomainMoment> for MomentInput {
    fn from(m: DomainMoment) -> Self {
        // pulse above i64::MAX cannot come from a client anyway
        Self {
            pulse: i64::try_from(m.pulse()).unwrap_or(i64::MAX),
            beat: i64::from(m.beat()),
            step_index: i64::from(m.step_index()),
        }
    }
}

impl RawRecord {
    /// A record relying on the token's embedded payload for its moment
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            moment: None,
            fields: BTreeMap::new(),
        }
    }

    /// A record with an explicit moment
    pub fn at(token: impl Into<String>, pulse: i64, beat: i64, step_index: i64) -> Self {
        Self {
            token: token.into(),
            moment: Some(MomentInput {
                pulse,
                beat,
                step_index,
            }),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Inbound batch: `{"records": [...]}` or a bare array of records
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RecordBatch {
    Wrapped { records: Vec<RawRecord> },
    Bare(Vec<RawRecord>),
}

impl RecordBatch {
    pub fn into_records(self) -> Vec<RawRecord> {
        match self {
            RecordBatch::Wrapped { records } | RecordBatch::Bare(records) => records,
        }
    }
}

/// A record that passed validation, ready to fold into a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord {
    pub token: CanonicalToken,
    pub source: String,
    pub moment: DomainMoment,
    pub fields: BTreeMap<String, String>,
    pub lineage: LineageFragment,
}
