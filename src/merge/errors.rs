//! Merge error types

use thiserror::Error;

use crate::clock::MomentError;
use crate::lineage::LineageError;
use crate::token::TokenError;

/// Why a single record was rejected
///
/// Record errors never abort a batch; they are collected and reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("invalid lineage: {0}")]
    InvalidLineage(#[from] LineageError),

    #[error("invalid moment: {0}")]
    InvalidMoment(#[from] MomentError),
}

impl RecordError {
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::InvalidToken(_) => "INVALID_TOKEN",
            RecordError::InvalidLineage(_) => "INVALID_LINEAGE",
            RecordError::InvalidMoment(_) => "INVALID_MOMENT",
        }
    }
}

/// Batch-level failure; nothing from the batch is applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("batch of {count} records exceeds the maximum of {max}")]
    BatchTooLarge { count: usize, max: usize },
}

impl MergeError {
    pub fn code(&self) -> &'static str {
        match self {
            MergeError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
        }
    }
}
