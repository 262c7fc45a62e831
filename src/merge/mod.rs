//! Merge subsystem
//!
//! Record validation and the dedupe/newer-wins fold of a batch into a
//! registry snapshot. Also hosts krystal harvest, which turns arbitrary JSON
//! into records for the same fold.

mod engine;
mod errors;
mod harvest;
mod record;

pub use engine::{MergeEngine, MergeResult, Rejection, DEFAULT_MAX_BATCH_RECORDS};
pub use errors::{MergeError, RecordError};
pub use harvest::{harvest, Harvest};
pub use record::{MomentInput, RawRecord, RecordBatch, ValidatedRecord};
