//! Token normalization
//!
//! Turns a shareable token (absolute URL, relative URL or bare base64url
//! token) into the [`CanonicalToken`] used as the registry dedupe key.
//!
//! Two raw tokens that differ only in host casing, default ports, trailing
//! slashes, query parameter order, escape spelling, lineage parameters or
//! ignore-listed tracking parameters normalize to the same identity.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use super::errors::{TokenError, TokenResult};
use super::LINEAGE_PARAM;

/// Origin used for relative references and bare tokens
pub const DEFAULT_BASE_ORIGIN: &str = "https://example.invalid";

/// Tracking/noise parameters dropped from identity. A trailing `*` matches a prefix.
pub const DEFAULT_IGNORE_PARAMS: &[&str] = &["utm_*", "fbclid", "gclid", "mc_cid", "mc_eid", "ref"];

const BARE_TOKEN_MIN_LEN: usize = 16;

fn short_route_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(?:stream/)?p~([^/]+)$").expect("short route pattern"))
}

/// Normalized identity of a token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalToken(String);

impl CanonicalToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IgnoreRule {
    Exact(String),
    Prefix(String),
}

impl IgnoreRule {
    fn parse(rule: &str) -> Option<Self> {
        let rule = rule.trim().to_ascii_lowercase();
        if rule.is_empty() {
            return None;
        }
        match rule.strip_suffix('*') {
            Some(prefix) if !prefix.is_empty() => Some(IgnoreRule::Prefix(prefix.to_string())),
            Some(_) => None,
            None => Some(IgnoreRule::Exact(rule)),
        }
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            IgnoreRule::Exact(k) => key == k,
            IgnoreRule::Prefix(p) => key.starts_with(p.as_str()),
        }
    }
}

/// Pure token normalizer
///
/// Holds only immutable configuration; `normalize` never consults time or
/// external state.
#[derive(Debug, Clone)]
pub struct TokenNormalizer {
    base: Url,
    ignore: Vec<IgnoreRule>,
}

impl TokenNormalizer {
    /// Create a normalizer with the given base origin and ignore-list
    pub fn new<I, S>(base_origin: &str, ignore_params: I) -> TokenResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let invalid = |reason: String| TokenError::InvalidBaseOrigin {
            origin: base_origin.to_string(),
            reason,
        };

        let base = Url::parse(base_origin.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(invalid("must be an absolute http(s) origin".to_string()));
        }

        let ignore = ignore_params
            .into_iter()
            .filter_map(|r| IgnoreRule::parse(r.as_ref()))
            .collect();

        Ok(Self { base, ignore })
    }

    /// Normalizer with the default origin and ignore-list
    pub fn standard() -> TokenResult<Self> {
        Self::new(DEFAULT_BASE_ORIGIN, DEFAULT_IGNORE_PARAMS.iter().copied())
    }

    /// The configured base origin
    pub fn base_origin(&self) -> &Url {
        &self.base
    }

    /// Resolve a raw token into an absolute http(s) URL without canonicalizing it
    pub fn resolve(&self, raw: &str) -> TokenResult<Url> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TokenError::Empty);
        }

        let reference: Cow<'_, str> = if looks_like_bare_token(trimmed) {
            Cow::Owned(format!("/stream/p/{}", trimmed))
        } else {
            Cow::Borrowed(trimmed)
        };

        let url = self
            .base
            .join(&reference)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(TokenError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(TokenError::MissingHost);
        }

        Ok(url)
    }

    /// Normalize a raw token into its canonical identity
    pub fn normalize(&self, raw: &str) -> TokenResult<CanonicalToken> {
        let mut url = self.resolve(raw)?;

        // Scheme/host casing and default ports are already canonical after parsing.
        let path = canonical_path(url.path());
        url.set_path(&path);

        let query = url.query().and_then(|q| self.canonical_params(q));
        url.set_query(query.as_deref());

        let fragment = url.fragment().and_then(|f| self.canonical_fragment(f));
        url.set_fragment(fragment.as_deref());

        Ok(CanonicalToken(url.into()))
    }

    fn is_ignored(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.ignore.iter().any(|rule| rule.matches(&key))
    }

    fn canonical_params(&self, raw: &str) -> Option<String> {
        let mut pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
            .filter(|(k, _)| !k.is_empty() && k != LINEAGE_PARAM && !self.is_ignored(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if pairs.is_empty() {
            return None;
        }

        pairs.sort();
        Some(
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&pairs)
                .finish(),
        )
    }

    fn canonical_fragment(&self, raw: &str) -> Option<String> {
        if raw.is_empty() {
            return None;
        }
        // Hash-router paths are not parameter lists; keep them verbatim.
        if !raw.contains('=') {
            return Some(normalize_escapes(raw));
        }
        self.canonical_params(raw)
    }
}

/// A bare base64url token (no scheme, no path separators)
pub fn looks_like_bare_token(s: &str) -> bool {
    s.len() >= BARE_TOKEN_MIN_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn canonical_path(path: &str) -> String {
    let path = normalize_escapes(path);

    let trimmed = path.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };

    match short_route_re().captures(trimmed) {
        Some(caps) => format!("/stream/p/{}", &caps[1]),
        None => trimmed.to_string(),
    }
}

/// Bytes left literal in a canonical path segment: unreserved, sub-delims, `:` and `@`.
/// Everything else, `/` inside a segment included, is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Decode every escape in each `/`-separated segment and re-encode with [`SEGMENT`]
///
/// Separators stay literal, so `a/b` and `a%2Fb` remain distinct.
fn normalize_escapes(s: &str) -> String {
    s.split('/')
        .map(|segment| {
            let decoded: Vec<u8> = percent_decode_str(segment).collect();
            percent_encode(&decoded, SEGMENT).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-decode a path segment into UTF-8 (lossy)
pub(crate) fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
