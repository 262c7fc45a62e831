//! Lineage extraction
//!
//! A token may carry its witness chain in repeated `add=` parameters (query
//! first, then fragment). Each value is the URL of an ancestor. The chain is
//! validated structurally and stored with the entry; it never takes part in
//! identity, ordering or the seal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

use crate::token::{CanonicalToken, TokenError, TokenNormalizer, LINEAGE_PARAM};

/// Default cap on witness references per token
pub const DEFAULT_MAX_LINEAGE_REFS: usize = 128;

/// Malformed witness chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    #[error("token cannot be parsed: {0}")]
    Token(#[from] TokenError),

    #[error("witness {position} is unparseable: {reason}")]
    Unparseable { position: usize, reason: String },

    #[error("witness {position} references the token itself")]
    SelfReference { position: usize },

    #[error("witness {position} repeats witness {first}")]
    Cycle { position: usize, first: usize },

    #[error("witness chain has {count} references (max {max})")]
    TooManyRefs { count: usize, max: usize },
}

/// One ancestor reference in a witness chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessRef {
    /// Index in the chain, root first
    pub position: usize,
    pub token: CanonicalToken,
    /// Witness URL as it appeared in the token
    pub source: String,
}

/// Decoded witness chain of a token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineageFragment {
    refs: Vec<WitnessRef>,
}

impl LineageFragment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn refs(&self) -> &[WitnessRef] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Nearest ancestor (last witness in the chain)
    pub fn parent(&self) -> Option<&WitnessRef> {
        self.refs.last()
    }
}

/// Decodes and validates witness chains
#[derive(Debug, Clone)]
pub struct LineageExtractor {
    normalizer: TokenNormalizer,
    max_refs: usize,
}

impl LineageExtractor {
    pub fn new(normalizer: TokenNormalizer, max_refs: usize) -> Self {
        Self {
            normalizer,
            max_refs,
        }
    }

    /// Extract the witness chain of a raw token
    pub fn extract(&self, raw: &str) -> Result<LineageFragment, LineageError> {
        let url = self.normalizer.resolve(raw)?;
        let leaf = self.normalizer.normalize(raw)?;

        let mut values: Vec<String> = Vec::new();
        if let Some(q) = url.query() {
            values.extend(lineage_values(q));
        }
        if let Some(f) = url.fragment().filter(|f| f.contains('=')) {
            values.extend(lineage_values(f));
        }

        // Count before parsing anything.
        if values.len() > self.max_refs {
            return Err(LineageError::TooManyRefs {
                count: values.len(),
                max: self.max_refs,
            });
        }

        let mut seen: HashMap<CanonicalToken, usize> = HashMap::with_capacity(values.len());
        let mut refs = Vec::with_capacity(values.len());

        for (position, source) in values.into_iter().enumerate() {
            let token = self
                .normalizer
                .normalize(&source)
                .map_err(|e| LineageError::Unparseable {
                    position,
                    reason: e.to_string(),
                })?;

            if token == leaf {
                return Err(LineageError::SelfReference { position });
            }
            if let Some(&first) = seen.get(&token) {
                return Err(LineageError::Cycle { position, first });
            }
            seen.insert(token.clone(), position);

            refs.push(WitnessRef {
                position,
                token,
                source,
            });
        }

        Ok(LineageFragment { refs })
    }
}

fn lineage_values(raw: &str) -> impl Iterator<Item = String> + '_ {
    form_urlencoded::parse(raw.as_bytes())
        .filter(|(k, _)| k == LINEAGE_PARAM)
        .map(|(_, v)| v.into_owned())
}
