//! Sigil Registry HTTP Routes
//!
//! - `POST /inhale`          merge a batch of records
//! - `POST /inhale/krystal`  harvest an arbitrary JSON document and merge it
//! - `GET  /seal`            current seal
//! - `GET  /urls`            paged source URLs in canonical order
//! - `GET  /state`           full entries
//! - `GET  /exhale`          whole registry as `mode=urls` (default) or `mode=state`
//!
//! `POST /inhale` and `/inhale/krystal` accept `include_urls=true` and
//! `include_state=true` to return the merged registry inline, up to the
//! configured inline caps. Over the cap the view is left out and a note
//! points at the paged endpoints.
//!
//! Read endpoints carry `ETag: "<seal>"` and answer a matching
//! `If-None-Match` with 304. For `/urls` that only applies at offset 0,
//! since later pages are fetched after the first one was validated.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::DomainMoment;
use crate::merge::RecordBatch;
use crate::observability::{Event, Logger};
use crate::registry::{
    InhaleReport, PublishedRegistry, RegistryEntry, RegistryStore, Seal, StoreError, StoreResult,
};

/// Cache policy for every read endpoint
pub const CACHE_CONTROL_VALUE: &str = "private, max-age=0, must-revalidate";

// ==================
// Shared State
// ==================

/// Page size bounds for `/urls` and caps on inline inhale views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingLimits {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Largest registry whose URLs an inhale response may carry inline
    pub max_inline_urls: usize,
    /// Largest registry whose state an inhale response may carry inline
    pub max_inline_state: usize,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            default_limit: 10_000,
            max_limit: 200_000,
            max_inline_urls: 20_000,
            max_inline_state: 10_000,
        }
    }
}

/// Registry state shared across handlers
pub struct SigilState {
    pub store: Arc<RegistryStore>,
    pub limits: ListingLimits,
}

impl SigilState {
    pub fn new(store: Arc<RegistryStore>, limits: ListingLimits) -> Self {
        Self { store, limits }
    }
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct RecordErrorBody {
    pub index: usize,
    pub code: &'static str,
    pub message: String,
}

/// `include_urls` / `include_state` on the inhale endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InlineViews {
    pub include_urls: bool,
    pub include_state: bool,
}

#[derive(Debug, Serialize)]
pub struct InhaleResponse<'a> {
    pub status: &'static str,
    pub request_id: String,
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub applied: usize,
    pub changed: bool,
    pub pruned: usize,
    pub state_seal: String,
    pub total: usize,
    pub errors: Vec<RecordErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateView<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl<'a> InhaleResponse<'a> {
    fn from_report(
        request_id: String,
        report: &'a InhaleReport,
        views: InlineViews,
        limits: ListingLimits,
    ) -> Self {
        let errors = report
            .rejected
            .iter()
            .map(|r| RecordErrorBody {
                index: r.index,
                code: r.error.code(),
                message: r.error.to_string(),
            })
            .collect();

        let registry = &report.registry;
        let mut notes = Vec::new();

        let urls = if !views.include_urls {
            None
        } else if registry.len() > limits.max_inline_urls {
            notes.push(format!(
                "urls suppressed: {} entries exceed the inline cap of {}; use GET /sigils/urls",
                registry.len(),
                limits.max_inline_urls
            ));
            None
        } else {
            Some(registry.urls())
        };

        let state = if !views.include_state {
            None
        } else if registry.len() > limits.max_inline_state {
            notes.push(format!(
                "state suppressed: {} entries exceed the inline cap of {}; use GET /sigils/state",
                registry.len(),
                limits.max_inline_state
            ));
            None
        } else {
            Some(StateView::of(registry))
        };

        Self {
            status: "ok",
            request_id,
            received: report.received,
            accepted: report.accepted,
            rejected: report.rejected.len(),
            applied: report.applied,
            changed: report.changed,
            pruned: report.pruned,
            state_seal: report.seal.to_hex(),
            total: report.total,
            errors,
            urls,
            state,
            notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SealResponse {
    pub seal: String,
}

#[derive(Debug, Serialize)]
pub struct UrlsResponse<'a> {
    pub status: &'static str,
    pub state_seal: String,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub urls: &'a [String],
}

/// Full entries of one published registry
#[derive(Debug, Serialize)]
pub struct StateView<'a> {
    pub total: usize,
    pub latest: Option<DomainMoment>,
    pub entries: Vec<&'a RegistryEntry>,
}

impl<'a> StateView<'a> {
    fn of(registry: &'a PublishedRegistry) -> Self {
        Self {
            total: registry.len(),
            latest: registry.latest_moment(),
            entries: registry.snapshot().iter().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StateResponse<'a> {
    pub status: &'static str,
    pub state_seal: String,
    #[serde(flatten)]
    pub view: StateView<'a>,
}

/// What `/exhale` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaleMode {
    Urls,
    State,
}

impl ExhaleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaleMode::Urls => "urls",
            ExhaleMode::State => "state",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExhaleResponse<'a> {
    pub status: &'static str,
    pub mode: &'static str,
    pub state_seal: String,
    pub urls: Option<&'a [String]>,
    pub state: Option<StateView<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            status: "error",
            error: message.into(),
            code: code.to_string(),
        }),
    )
}

fn store_error(err: StoreError) -> ApiError {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    api_error(status, err.code(), err.public_message())
}

// ==================
// Sigil Routes
// ==================

/// Create sigil registry routes
pub fn sigil_routes(state: Arc<SigilState>) -> Router {
    Router::new()
        .route("/inhale", post(inhale_handler))
        .route("/inhale/krystal", post(krystal_handler))
        .route("/seal", get(seal_handler))
        .route("/urls", get(urls_handler))
        .route("/state", get(state_handler))
        .route("/exhale", get(exhale_handler))
        .with_state(state)
}

// ==================
// Write Handlers
// ==================

async fn inhale_handler(
    State(state): State<Arc<SigilState>>,
    views: Result<Query<InlineViews>, QueryRejection>,
    body: Result<Json<RecordBatch>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Query(views) = views.map_err(|e| api_error(e.status(), "INVALID_QUERY", e.body_text()))?;
    let Json(body) = body.map_err(|e| api_error(e.status(), "INVALID_BODY", e.body_text()))?;
    let records = body.into_records();
    run_inhale(&state, views, move |store| store.inhale(records)).await
}

async fn krystal_handler(
    State(state): State<Arc<SigilState>>,
    views: Result<Query<InlineViews>, QueryRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Query(views) = views.map_err(|e| api_error(e.status(), "INVALID_QUERY", e.body_text()))?;
    let Json(doc) = body.map_err(|e| api_error(e.status(), "INVALID_BODY", e.body_text()))?;
    run_inhale(&state, views, move |store| store.inhale_krystal(&doc)).await
}

/// Run a store write off the async executor
async fn run_inhale<F>(state: &SigilState, views: InlineViews, op: F) -> Result<Response, ApiError>
where
    F: FnOnce(&RegistryStore) -> StoreResult<InhaleReport> + Send + 'static,
{
    let request_id = Uuid::new_v4().to_string();
    Logger::event(Event::InhaleReceived)
        .field("request_id", &request_id)
        .trace();

    let store = Arc::clone(&state.store);
    let outcome = tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|_| {
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                "Registry temporarily unavailable",
            )
        })?;

    match outcome {
        Ok(report) => {
            let body = InhaleResponse::from_report(request_id, &report, views, state.limits);
            Ok(Json(body).into_response())
        }
        Err(e) => {
            Logger::event(Event::InhaleRejected)
                .field("request_id", &request_id)
                .field("code", e.code())
                .warn();
            Err(store_error(e))
        }
    }
}

// ==================
// Read Handlers
// ==================

async fn seal_handler(
    State(state): State<Arc<SigilState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let current = state.store.current().map_err(store_error)?;
    let seal = current.seal();
    if etag_matches(&headers, &seal) {
        return Ok(not_modified(&seal));
    }

    Ok((cache_headers(&seal), Json(SealResponse { seal: seal.to_hex() })).into_response())
}

async fn urls_handler(
    State(state): State<Arc<SigilState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (offset, limit) = parse_listing(&params, state.limits)?;
    let current = state.store.current().map_err(store_error)?;
    let seal = current.seal();
    if offset == 0 && etag_matches(&headers, &seal) {
        return Ok(not_modified(&seal));
    }

    let body = UrlsResponse {
        status: "ok",
        state_seal: seal.to_hex(),
        total: current.len(),
        offset,
        limit,
        urls: current.urls_page(offset, limit),
    };
    Ok((cache_headers(&seal), Json(body)).into_response())
}

async fn state_handler(
    State(state): State<Arc<SigilState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let current = state.store.current().map_err(store_error)?;
    let seal = current.seal();
    if etag_matches(&headers, &seal) {
        return Ok(not_modified(&seal));
    }

    let body = StateResponse {
        status: "ok",
        state_seal: seal.to_hex(),
        view: StateView::of(&current),
    };
    Ok((cache_headers(&seal), Json(body)).into_response())
}

async fn exhale_handler(
    State(state): State<Arc<SigilState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mode = parse_mode(&params)?;
    let current = state.store.current().map_err(store_error)?;
    let seal = current.seal();
    if etag_matches(&headers, &seal) {
        return Ok(not_modified(&seal));
    }

    let body = ExhaleResponse {
        status: "ok",
        mode: mode.as_str(),
        state_seal: seal.to_hex(),
        urls: (mode == ExhaleMode::Urls).then(|| current.urls()),
        state: (mode == ExhaleMode::State).then(|| StateView::of(&current)),
    };
    Ok((cache_headers(&seal), Json(body)).into_response())
}

// ==================
// Helpers
// ==================

fn parse_listing(
    params: &HashMap<String, String>,
    limits: ListingLimits,
) -> Result<(usize, usize), ApiError> {
    let offset = match params.get("offset") {
        None => 0,
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            api_error(StatusCode::BAD_REQUEST, "INVALID_OFFSET", "offset must be a non-negative integer")
        })?,
    };

    let limit = match params.get("limit") {
        None => limits.default_limit,
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(n) if n >= 1 => n,
            _ => {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "INVALID_LIMIT",
                    "limit must be a positive integer",
                ))
            }
        },
    };

    Ok((offset, limit.min(limits.max_limit)))
}

fn parse_mode(params: &HashMap<String, String>) -> Result<ExhaleMode, ApiError> {
    match params.get("mode").map(|m| m.trim()) {
        None | Some("urls") => Ok(ExhaleMode::Urls),
        Some("state") => Ok(ExhaleMode::State),
        Some(_) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_MODE",
            "mode must be 'urls' or 'state'",
        )),
    }
}

fn cache_headers(seal: &Seal) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
    if let Ok(etag) = HeaderValue::from_str(&seal.etag()) {
        headers.insert(header::ETAG, etag);
    }
    headers
}

fn not_modified(seal: &Seal) -> Response {
    (StatusCode::NOT_MODIFIED, cache_headers(seal)).into_response()
}

fn etag_matches(headers: &HeaderMap, seal: &Seal) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let etag = seal.etag();
    value
        .split(',')
        .map(str::trim)
        .any(|tag| tag == "*" || tag == etag || tag.strip_prefix("W/") == Some(etag.as_str()))
}
