//! Content-addressed seal over a snapshot
//!
//! The seal is SHA-256 over a length-prefixed canonical encoding of every
//! entry in canonical token order:
//!
//! ```text
//! entry := len32(token) token pulse:u64be beat:u32be step:u32be count32(fields) field*
//! field := len32(key) key len32(value) value
//! ```
//!
//! Source tokens and lineage are not part of the encoding, so two snapshots
//! with the same logical content share a seal regardless of how they were
//! built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::snapshot::{RegistryEntry, RegistrySnapshot};

/// SHA-256 seal of an empty registry
pub const EMPTY_SEAL_HEX: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// 32-byte digest identifying a snapshot's content
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seal([u8; 32]);

impl Seal {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters
    pub fn to_hex(&self) -> String {
        format!("{:x}", Output::<Sha256>::from(self.0))
    }

    /// Quoted form used as an HTTP entity tag
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.to_hex())
    }
}

impl fmt::Display for Seal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Seal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seal({})", self.to_hex())
    }
}

/// Hex string that is not a 32-byte digest
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid seal: {0}")]
pub struct InvalidSeal(pub String);

impl FromStr for Seal {
    type Err = InvalidSeal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidSeal(s.to_string()));
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidSeal(s.to_string()))?;
        }
        Ok(Seal(out))
    }
}

impl Serialize for Seal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Seal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the seal of a snapshot
pub fn seal(snapshot: &RegistrySnapshot) -> Seal {
    let mut hasher = Sha256::new();
    for entry in snapshot.iter() {
        encode_entry(&mut hasher, entry);
    }
    Seal(hasher.finalize().into())
}

fn encode_entry(hasher: &mut Sha256, entry: &RegistryEntry) {
    put_bytes(hasher, entry.token.as_bytes());
    hasher.update(entry.moment.pulse().to_be_bytes());
    hasher.update(entry.moment.beat().to_be_bytes());
    hasher.update(entry.moment.step_index().to_be_bytes());
    hasher.update(len32(entry.fields.len()).to_be_bytes());
    for (k, v) in &entry.fields {
        put_bytes(hasher, k.as_bytes());
        put_bytes(hasher, v.as_bytes());
    }
}

fn put_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update(len32(bytes.len()).to_be_bytes());
    hasher.update(bytes);
}

// Lengths beyond u32 cannot occur under the request size limits.
fn len32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
