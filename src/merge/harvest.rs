//! Krystal harvest
//!
//! A krystal is any JSON document a client has lying around (an export, a
//! share sheet dump, a bookmark file). Harvest walks it and picks out every
//! string that resolves to a token carrying a decodable payload.

use serde_json::Value;

use crate::token::{extract_payload, looks_like_bare_token, TokenNormalizer};

use super::record::RawRecord;

/// Records found in a krystal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harvest {
    pub records: Vec<RawRecord>,
    /// Token-like strings examined, whether or not they decoded
    pub candidates: usize,
}

/// Walk a JSON document and collect payload-bearing tokens
///
/// Records keep document order. Duplicates are left for the merge to collapse.
pub fn harvest(doc: &Value, normalizer: &TokenNormalizer) -> Harvest {
    let mut out = Harvest::default();
    walk(doc, normalizer, &mut out);
    out
}

fn walk(v: &Value, normalizer: &TokenNormalizer, out: &mut Harvest) {
    match v {
        Value::String(s) => visit(s, normalizer, out),
        Value::Array(items) => items.iter().for_each(|item| walk(item, normalizer, out)),
        Value::Object(map) => map.values().for_each(|item| walk(item, normalizer, out)),
        _ => {}
    }
}

fn visit(s: &str, normalizer: &TokenNormalizer, out: &mut Harvest) {
    let s = s.trim();
    if !is_token_like(s) {
        return;
    }
    out.candidates += 1;

    let has_pulse = normalizer
        .resolve(s)
        .ok()
        .and_then(|url| extract_payload(&url))
        .map_or(false, |p| p.pulse.is_some());
    if has_pulse {
        out.records.push(RawRecord::new(s));
    }
}

fn is_token_like(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    looks_like_bare_token(s)
        || s.contains("http")
        || s.contains("/stream")
        || s.contains("/s/")
        || s.contains("/p~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use serde_json::json;

    fn token(pulse: u64) -> String {
        let body = serde_json::to_vec(&json!({"pulse": pulse, "beat": 1, "stepIndex": 2})).unwrap();
        format!("https://x/stream/p/{}", URL_SAFE_NO_PAD.encode(body))
    }

    #[test]
    fn test_harvest_nested_document() {
        let doc = json!({
            "title": "export",
            "items": [
                {"url": token(1)},
                {"nested": {"deep": [token(2), "https://x/plain"]}},
                42,
                null
            ]
        });
        let found = harvest(&doc, &TokenNormalizer::standard().unwrap());

        assert_eq!(found.candidates, 3);
        let tokens: Vec<&str> = found.records.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec![token(1).as_str(), token(2).as_str()]);
        assert!(found.records.iter().all(|r| r.moment.is_none()));
    }

    #[test]
    fn test_harvest_ignores_plain_text() {
        let doc = json!(["hello world", "", "   "]);
        let found = harvest(&doc, &TokenNormalizer::standard().unwrap());
        assert_eq!(found, Harvest::default());
    }
}
