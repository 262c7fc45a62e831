//! HTTP Route Tests
//!
//! Drive the full router in-process: inhale, seal, exhale, conditional
//! reads, paging, size guards and metrics.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use sigil_registry::http_server::{HttpServer, HttpServerConfig, ListingLimits, SigilState};
use sigil_registry::lineage::DEFAULT_MAX_LINEAGE_REFS;
use sigil_registry::merge::MergeEngine;
use sigil_registry::observability::MetricsRegistry;
use sigil_registry::registry::{MemoryPersistence, RegistryStore, EMPTY_SEAL_HEX};
use sigil_registry::token::TokenNormalizer;

// =============================================================================
// Test Utilities
// =============================================================================

struct Setup {
    max_batch: usize,
    max_body: usize,
    limits: ListingLimits,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            max_batch: 1_000,
            max_body: 1024 * 1024,
            limits: ListingLimits {
                default_limit: 100,
                max_limit: 200,
                ..ListingLimits::default()
            },
        }
    }
}

impl Setup {
    fn router(self) -> Router {
        let engine = MergeEngine::new(
            TokenNormalizer::standard().expect("standard normalizer"),
            DEFAULT_MAX_LINEAGE_REFS,
            self.max_batch,
        );
        let store = RegistryStore::open(
            engine,
            0,
            Arc::new(MemoryPersistence::new()),
            Arc::new(MetricsRegistry::new()),
        )
        .expect("store opens");
        let config = HttpServerConfig {
            max_body_bytes: self.max_body,
            ..HttpServerConfig::default()
        };
        HttpServer::with_config(config, Arc::new(SigilState::new(Arc::new(store), self.limits)))
            .router()
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn record(token: &str, pulse: u64, beat: u32, step: u32) -> Value {
    json!({"token": token, "moment": {"pulse": pulse, "beat": beat, "stepIndex": step}})
}

// =============================================================================
// Inhale and Seal
// =============================================================================

#[tokio::test]
async fn test_inhale_then_seal_lifecycle() {
    let router = Setup::default().router();

    let (status, body) = send(&router, get("/sigils/seal")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seal"], EMPTY_SEAL_HEX);

    let batch = json!({"records": [record("https://x/s/a?p=1", 9615429, 26, 8)]});
    let (status, body) = send(&router, post_json("/sigils/inhale", &batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["changed"], true);
    assert_eq!(body["accepted"], 1);
    assert!(body["request_id"].as_str().is_some());
    let sealed = body["state_seal"].as_str().unwrap().to_string();
    assert_ne!(sealed, EMPTY_SEAL_HEX);

    let (_, body) = send(&router, post_json("/sigils/inhale", &batch)).await;
    assert_eq!(body["changed"], false);
    assert_eq!(body["state_seal"], sealed.as_str());

    let older = json!([record("https://x/s/a?p=1", 9615429, 26, 7)]);
    let (_, body) = send(&router, post_json("/sigils/inhale", &older)).await;
    assert_eq!(body["changed"], false);

    let (_, body) = send(&router, get("/sigils/seal")).await;
    assert_eq!(body["seal"], sealed.as_str());
}

#[tokio::test]
async fn test_rejections_are_reported_per_record() {
    let router = Setup::default().router();
    let batch = json!({"records": [
        record("https://x/s/ok", 1, 0, 0),
        record("https://x/s/bad", 1, 99, 0),
    ]});

    let (status, body) = send(&router, post_json("/sigils/inhale", &batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["rejected"], 1);
    assert_eq!(body["errors"][0]["index"], 1);
    assert_eq!(body["errors"][0]["code"], "INVALID_MOMENT");
}

#[tokio::test]
async fn test_krystal_inhale_harvests_tokens() {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    let payload = URL_SAFE_NO_PAD.encode(br#"{"u": 42, "b": 3, "s": 4}"#);
    let doc = json!({
        "title": "shared",
        "children": [{"link": format!("https://x/stream/p/{}", payload)}],
        "noise": "https://x/plain",
    });

    let router = Setup::default().router();
    let (status, body) = send(&router, post_json("/sigils/inhale/krystal", &doc)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["changed"], true);
}

#[tokio::test]
async fn test_inhale_returns_inline_views_on_request() {
    let router = Setup::default().router();
    let batch = json!([
        record("https://x/s/a", 1, 0, 0),
        record("https://x/s/b", 2, 0, 0),
    ]);

    let (_, body) = send(&router, post_json("/sigils/inhale", &batch)).await;
    assert!(body.get("urls").is_none());
    assert!(body.get("state").is_none());
    assert!(body.get("notes").is_none());

    let more = json!([record("https://x/s/c", 3, 0, 0)]);
    let uri = "/sigils/inhale?include_urls=true&include_state=true";
    let (status, body) = send(&router, post_json(uri, &more)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["urls"].as_array().unwrap().len(), 3);
    assert_eq!(body["state"]["total"], 3);
    assert_eq!(body["state"]["entries"].as_array().unwrap().len(), 3);
    assert_eq!(body["state"]["latest"]["pulse"], 3);

    let (_, listed) = send(&router, get("/sigils/urls")).await;
    assert_eq!(body["urls"], listed["urls"]);
}

#[tokio::test]
async fn test_inline_views_over_cap_are_suppressed() {
    let router = Setup {
        limits: ListingLimits {
            max_inline_urls: 1,
            max_inline_state: 1,
            ..ListingLimits::default()
        },
        ..Setup::default()
    }
    .router();

    let batch = json!([
        record("https://x/s/a", 1, 0, 0),
        record("https://x/s/b", 2, 0, 0),
    ]);
    let uri = "/sigils/inhale?include_urls=true&include_state=true";
    let (status, body) = send(&router, post_json(uri, &batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert!(body.get("urls").is_none());
    assert!(body.get("state").is_none());

    let notes = body["notes"].as_array().unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].as_str().unwrap().starts_with("urls suppressed"));
    assert!(notes[1].as_str().unwrap().starts_with("state suppressed"));
}

#[tokio::test]
async fn test_bad_inline_flag_is_bad_request() {
    let router = Setup::default().router();
    let batch = json!([record("https://x/s/a", 1, 0, 0)]);
    let (status, body) = send(&router, post_json("/sigils/inhale?include_urls=maybe", &batch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_QUERY");
}

// =============================================================================
// Exhale
// =============================================================================

#[tokio::test]
async fn test_exhale_defaults_to_urls() {
    let router = Setup::default().router();
    let batch = json!([
        record("https://x/s/b", 2, 0, 0),
        record("https://x/s/a", 1, 0, 0),
    ]);
    let (_, inhaled) = send(&router, post_json("/sigils/inhale", &batch)).await;

    let (status, body) = send(&router, get("/sigils/exhale")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "urls");
    assert_eq!(body["state_seal"], inhaled["state_seal"]);
    assert!(body["state"].is_null());

    let (_, listed) = send(&router, get("/sigils/urls")).await;
    assert_eq!(body["urls"], listed["urls"]);
    assert_eq!(body["urls"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_exhale_state_mode() {
    let router = Setup::default().router();
    send(&router, post_json("/sigils/inhale", &json!([record("https://x/s/a", 7, 1, 2)]))).await;

    let (status, body) = send(&router, get("/sigils/exhale?mode=state")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "state");
    assert!(body["urls"].is_null());
    assert_eq!(body["state"]["total"], 1);
    assert_eq!(body["state"]["latest"]["pulse"], 7);

    let (_, state) = send(&router, get("/sigils/state")).await;
    assert_eq!(body["state"]["entries"], state["entries"]);
}

#[tokio::test]
async fn test_exhale_rejects_unknown_mode() {
    let router = Setup::default().router();
    let (status, body) = send(&router, get("/sigils/exhale?mode=everything")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_MODE");
}

// =============================================================================
// Conditional Reads
// =============================================================================

#[tokio::test]
async fn test_matching_etag_returns_not_modified() {
    let router = Setup::default().router();
    send(&router, post_json("/sigils/inhale", &json!([record("https://x/s/a", 1, 0, 0)]))).await;

    let response = router.clone().oneshot(get("/sigils/seal")).await.unwrap();
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
    assert!(response.headers().contains_key(header::CACHE_CONTROL));

    for uri in [
        "/sigils/seal",
        "/sigils/urls",
        "/sigils/state",
        "/sigils/exhale",
        "/sigils/exhale?mode=state",
    ] {
        let req = Request::builder()
            .uri(uri)
            .header(header::IF_NONE_MATCH, &etag)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED, "{}", uri);
    }

    let req = Request::builder()
        .uri("/sigils/seal")
        .header(header::IF_NONE_MATCH, "\"stale\"")
        .body(Body::empty())
        .unwrap();
    assert_eq!(router.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);
}

// =============================================================================
// Paging
// =============================================================================

#[tokio::test]
async fn test_three_hundred_records_page_by_two_hundred() {
    let router = Setup::default().router();
    let records: Vec<Value> = (0..300)
        .map(|i| record(&format!("https://x/s/{:03}", i), 10 + i, 0, 0))
        .collect();
    let (status, _) = send(&router, post_json("/sigils/inhale", &json!({ "records": records }))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, first) = send(&router, get("/sigils/urls?offset=0&limit=200")).await;
    assert_eq!(first["total"], 300);
    assert_eq!(first["urls"].as_array().unwrap().len(), 200);

    let (_, second) = send(&router, get("/sigils/urls?offset=200&limit=200")).await;
    assert_eq!(second["urls"].as_array().unwrap().len(), 100);
    assert_eq!(second["state_seal"], first["state_seal"]);

    let mut all: Vec<String> = first["urls"]
        .as_array()
        .unwrap()
        .iter()
        .chain(second["urls"].as_array().unwrap())
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let listed = all.clone();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 300);
    assert_eq!(listed, all);
}

#[tokio::test]
async fn test_limit_is_clamped_and_validated() {
    let router = Setup::default().router();

    let (status, body) = send(&router, get("/sigils/urls?limit=5000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 200);

    let (status, body) = send(&router, get("/sigils/urls?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_LIMIT");

    let (status, body) = send(&router, get("/sigils/urls?offset=-3")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_OFFSET");
}

// =============================================================================
// Guards
// =============================================================================

#[tokio::test]
async fn test_oversized_batch_is_rejected_wholesale() {
    let router = Setup {
        max_batch: 2,
        ..Setup::default()
    }
    .router();
    let batch = json!([
        record("https://x/s/1", 1, 0, 0),
        record("https://x/s/2", 1, 0, 0),
        record("https://x/s/3", 1, 0, 0),
    ]);

    let (status, body) = send(&router, post_json("/sigils/inhale", &batch)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "BATCH_TOO_LARGE");

    let (_, body) = send(&router, get("/sigils/seal")).await;
    assert_eq!(body["seal"], EMPTY_SEAL_HEX);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let router = Setup {
        max_body: 256,
        ..Setup::default()
    }
    .router();
    let records: Vec<Value> = (0..50).map(|i| record(&format!("https://x/s/{}", i), 1, 0, 0)).collect();

    let (status, _) = send(&router, post_json("/sigils/inhale", &json!(records))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let router = Setup::default().router();
    let req = Request::builder()
        .method("POST")
        .uri("/sigils/inhale")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"records\": [}"))
        .unwrap();

    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_BODY");
}

// =============================================================================
// Observability
// =============================================================================

#[tokio::test]
async fn test_health_and_metrics() {
    let router = Setup::default().router();

    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    send(&router, post_json("/sigils/inhale", &json!([record("https://x/s/a", 1, 0, 0)]))).await;
    let (status, body) = send(&router, get("/observability/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inhale_requests"], 1);
    assert_eq!(body["commits"], 1);
    assert_eq!(body["entries"], 1);
}
