//! Domain clock for sigil registry ordering
//!
//! Recency is decided by a three-part coordinate (pulse, beat, stepIndex)
//! carried inside every record. Wall-clock time is never consulted.
//!
//! # Bounds
//!
//! - pulse: non-negative, unbounded above (u64)
//! - beat: `0..BEATS_PER_DAY`
//! - stepIndex: `0..STEPS_PER_BEAT`
//!
//! Out-of-range values are rejected with [`MomentError`], never clamped.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Beats in one day of the domain calendar
pub const BEATS_PER_DAY: u32 = 36;

/// Steps in one beat of the domain calendar
pub const STEPS_PER_BEAT: u32 = 44;

/// Structural error for a moment that violates its declared bounds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MomentError {
    #[error("moment field '{field}' is missing")]
    Missing { field: &'static str },

    #[error("moment field '{field}' is negative: {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("moment field '{field}' = {value} exceeds bound {bound}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        bound: u32,
    },
}

/// A point on the domain clock
///
/// Field order matters: the derived `Ord` is lexicographic on
/// (pulse, beat, step_index), which is exactly the recency rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawMoment")]
pub struct DomainMoment {
    pulse: u64,
    beat: u32,
    #[serde(rename = "stepIndex")]
    step_index: u32,
}

impl DomainMoment {
    /// The origin of the domain clock
    pub const ZERO: DomainMoment = DomainMoment {
        pulse: 0,
        beat: 0,
        step_index: 0,
    };

    /// Build a moment, validating beat and step bounds
    pub fn new(pulse: u64, beat: u32, step_index: u32) -> Result<Self, MomentError> {
        if beat >= BEATS_PER_DAY {
            return Err(MomentError::OutOfRange {
                field: "beat",
                value: i64::from(beat),
                bound: BEATS_PER_DAY,
            });
        }
        if step_index >= STEPS_PER_BEAT {
            return Err(MomentError::OutOfRange {
                field: "stepIndex",
                value: i64::from(step_index),
                bound: STEPS_PER_BEAT,
            });
        }
        Ok(Self {
            pulse,
            beat,
            step_index,
        })
    }

    /// Build a moment from untrusted signed integers
    pub fn from_parts(pulse: i64, beat: i64, step_index: i64) -> Result<Self, MomentError> {
        let pulse = non_negative("pulse", pulse)?;
        let beat = bounded("beat", beat, BEATS_PER_DAY)?;
        let step_index = bounded("stepIndex", step_index, STEPS_PER_BEAT)?;
        Ok(Self {
            pulse,
            beat,
            step_index,
        })
    }

    pub fn pulse(&self) -> u64 {
        self.pulse
    }

    pub fn beat(&self) -> u32 {
        self.beat
    }

    pub fn step_index(&self) -> u32 {
        self.step_index
    }
}

impl fmt::Display for DomainMoment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.pulse, self.beat, self.step_index)
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, MomentError> {
    u64::try_from(value).map_err(|_| MomentError::Negative { field, value })
}

fn bounded(field: &'static str, value: i64, bound: u32) -> Result<u32, MomentError> {
    let v = non_negative(field, value)?;
    if v >= u64::from(bound) {
        return Err(MomentError::OutOfRange { field, value, bound });
    }
    // bound is a u32, so v fits
    Ok(v as u32)
}

/// Compare two moments on the domain clock
pub fn compare(a: &DomainMoment, b: &DomainMoment) -> Ordering {
    a.cmp(b)
}

/// True unless `a` is strictly older than `b`
pub fn is_newer_or_equal(a: &DomainMoment, b: &DomainMoment) -> bool {
    compare(a, b) != Ordering::Less
}

/// Inbound wire form, signed so negative values surface as errors
#[derive(Debug, Clone, Copy, Deserialize)]
struct RawMoment {
    pulse: i64,
    beat: i64,
    #[serde(rename = "stepIndex", alias = "step_index")]
    step_index: i64,
}

impl TryFrom<RawMoment> for DomainMoment {
    type Error = MomentError;

    fn try_from(raw: RawMoment) -> Result<Self, Self::Error> {
        DomainMoment::from_parts(raw.pulse, raw.beat, raw.step_index)
    }
}
