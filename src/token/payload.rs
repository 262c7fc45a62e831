//! Embedded payload decoding
//!
//! Shareable tokens usually carry their own record as a base64url JSON
//! object, either as the last path segment of `/stream/p/<token>` or in a
//! `p`, `t`, `root` or `token` parameter. Compact payloads use short keys
//! (`u`, `b`, `s`, `c`); older ones use snake_case. This module finds the
//! first decodable candidate and maps it onto moment parts and display
//! fields.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use regex::Regex;
use serde_json::{Map, Value};
use url::{form_urlencoded, Url};

use super::errors::PayloadError;
use super::normalizer::percent_decode;
use crate::clock::{DomainMoment, MomentError};

/// Upper bound on a decoded payload
pub const MAX_DECODED_BYTES: usize = 2_000_000;

const PAYLOAD_PARAMS: &[&str] = &["p", "t", "root", "token"];
const TOKEN_PREFIXES: &[char] = &['c', 'j', 'p', 't'];

const PULSE_KEYS: &[&str] = &["pulse", "u"];
const BEAT_KEYS: &[&str] = &["beat", "b"];
const STEP_KEYS: &[&str] = &["stepIndex", "s", "step_index", "step"];

/// Display fields and the payload keys they may arrive under
const DISPLAY_FIELDS: &[(&str, &[&str])] = &[
    ("chakraDay", &["chakraDay", "c", "chakra_day"]),
    ("kaiSignature", &["kaiSignature", "kai_signature"]),
    ("originUrl", &["originUrl", "origin_url"]),
    ("parentUrl", &["parentUrl", "parent_url"]),
    ("userPhiKey", &["userPhiKey"]),
    ("phiKey", &["phiKey"]),
    ("phikey", &["phikey"]),
];

fn stream_payload_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/(?:stream/p/|stream/p~|p~)([^/]+)$").expect("stream payload pattern")
    })
}

fn content_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/stream/c/[0-9a-fA-F]{16,}$").expect("content id pattern"))
}

/// Record data decoded from a token's embedded payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedPayload {
    pub pulse: Option<i64>,
    pub beat: Option<i64>,
    pub step_index: Option<i64>,
    pub fields: BTreeMap<String, String>,
}

impl EmbeddedPayload {
    /// Map a decoded JSON object onto moment parts and display fields
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let mut fields = BTreeMap::new();
        for (name, keys) in DISPLAY_FIELDS {
            if let Some(v) = first_string(obj, keys) {
                fields.insert((*name).to_string(), v);
            }
        }

        Self {
            pulse: first_int(obj, PULSE_KEYS),
            beat: first_int(obj, BEAT_KEYS),
            step_index: first_int(obj, STEP_KEYS),
            fields,
        }
    }

    /// Moment carried by the payload; beat and step default to zero
    pub fn moment(&self) -> Result<DomainMoment, MomentError> {
        let pulse = self.pulse.ok_or(MomentError::Missing { field: "pulse" })?;
        DomainMoment::from_parts(pulse, self.beat.unwrap_or(0), self.step_index.unwrap_or(0))
    }
}

/// Find and decode the first embedded payload of a resolved token URL
///
/// Returns `None` for content-id routes and for URLs with no decodable candidate.
pub fn extract_payload(url: &Url) -> Option<EmbeddedPayload> {
    candidate_tokens(url)
        .iter()
        .find_map(|tok| decode_token(tok).ok())
        .map(|obj| EmbeddedPayload::from_object(&obj))
}

/// Candidate payload tokens in priority order: path, query, fragment
fn candidate_tokens(url: &Url) -> Vec<String> {
    let path = url.path();
    if content_id_re().is_match(path) {
        return Vec::new();
    }

    let mut candidates = Vec::new();

    if let Some(caps) = stream_payload_re().captures(path) {
        candidates.push(percent_decode(&caps[1]));
    }

    let mut push_params = |raw: &str| {
        for (k, v) in form_urlencoded::parse(raw.as_bytes()) {
            if PAYLOAD_PARAMS.contains(&k.as_ref()) {
                candidates.push(v.into_owned());
            }
        }
    };
    if let Some(q) = url.query() {
        push_params(q);
    }
    if let Some(f) = url.fragment().filter(|f| f.contains('=')) {
        push_params(f);
    }

    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

/// Decode one payload token into a JSON object
///
/// Accepts raw `{...}` JSON, plain base64url JSON, and base64url JSON behind
/// a single-letter `c:`/`j:`/`p:`/`t:` prefix.
pub fn decode_token(token: &str) -> Result<Map<String, Value>, PayloadError> {
    let tok = token.trim();

    if tok.starts_with('{') && tok.ends_with('}') {
        return into_object(serde_json::from_str(tok));
    }

    let b64 = strip_prefix(tok).trim_end_matches('=');
    if b64.len() / 4 * 3 > MAX_DECODED_BYTES {
        return Err(PayloadError::TooLarge(b64.len() / 4 * 3));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|_| PayloadError::NotBase64)?;
    if bytes.len() > MAX_DECODED_BYTES {
        return Err(PayloadError::TooLarge(bytes.len()));
    }

    let text = String::from_utf8(bytes).map_err(|_| PayloadError::NotUtf8)?;
    into_object(serde_json::from_str(&text))
}

fn into_object(parsed: serde_json::Result<Value>) -> Result<Map<String, Value>, PayloadError> {
    match parsed {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PayloadError::NotObject),
        Err(e) => Err(PayloadError::NotJson(e.to_string())),
    }
}

fn strip_prefix(tok: &str) -> &str {
    let mut chars = tok.chars();
    match (chars.next(), chars.next()) {
        (Some(p), Some(':')) if TOKEN_PREFIXES.contains(&p.to_ascii_lowercase()) => &tok[2..],
        _ => tok,
    }
}

fn first_int(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(as_int))
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Integers, finite floats (truncated) and numeric strings; never booleans
fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}
