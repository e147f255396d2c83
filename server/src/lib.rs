pub mod errors;
pub mod lookup;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch};
use axum::{Json, Router};
use cardex_core::{DocId, Document, DocumentSummary, NewDocument, Store, StoreStats, DEFAULT_SEARCH_LIMIT};
use errors::ApiError;
use lookup::{lookup, MatchType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 500;
const SNIPPET_CHARS: usize = 200;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
}
fn default_k() -> usize { DEFAULT_SEARCH_LIMIT }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub title: String,
    pub doc_type: String,
    pub source: String,
    pub updated_at: String,
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<usize>,
}

impl SearchHit {
    fn from_document(doc: &Document, raw_terms: &[String]) -> Self {
        Self {
            doc_id: doc.id,
            title: doc.title.clone(),
            doc_type: doc.doc_type.clone(),
            source: doc.source.clone(),
            updated_at: doc.updated_at.format(&Rfc3339).unwrap_or_default(),
            snippet: snippet(&doc.body, raw_terms),
            match_type: None,
            relevance: None,
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub admin_token: Option<String>,
}

pub fn build_app(db_path: String) -> Result<Router> {
    let store = Store::open(&db_path)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    Ok(router(AppState { store: Arc::new(store), admin_token }))
}

pub fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/lookup", get(lookup_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/documents", get(list_handler).post(create_handler))
        .route("/documents/:doc_id", patch(update_handler).delete(delete_handler))
        .route("/stats", get(stats_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, MAX_K);
    let docs = match &params.doc_type {
        Some(doc_type) => state.store.search_by_type(doc_type, &params.q, usize::MAX)?,
        None => state.store.search(&params.q, usize::MAX)?,
    };
    let total_hits = docs.len();
    let raw_terms = raw_terms(&params.q);
    let results: Vec<SearchHit> = docs.iter().take(k).map(|d| SearchHit::from_document(d, &raw_terms)).collect();
    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits, returned = results.len(), "search served");
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn lookup_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, MAX_K);
    let raw_terms = raw_terms(&params.q);
    let hits = lookup(state.store.documents()?, &params.q, usize::MAX);
    let total_hits = hits.len();
    let results: Vec<SearchHit> = hits
        .into_iter()
        .take(k)
        .map(|hit| SearchHit {
            match_type: Some(hit.match_type),
            relevance: Some(hit.relevance),
            ..SearchHit::from_document(&hit.doc, &raw_terms)
        })
        .collect();
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    state
        .store
        .get_document(doc_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("document {doc_id} not found")))
}

pub async fn list_handler(State(state): State<AppState>) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    Ok(Json(state.store.list_documents()?))
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StoreStats>, ApiError> {
    Ok(Json(state.store.get_stats()?))
}

// --- Admin endpoints ---
async fn create_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(doc): Json<NewDocument>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    authorize(&state, &headers)?;
    let doc_id = state.store.add_document(doc)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "doc_id": doc_id }))))
}

async fn update_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    if req.title.is_none() && req.body.is_none() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }
    if !state.store.update_document(doc_id, req.title.as_deref(), req.body.as_deref())? {
        return Err(ApiError::NotFound(format!("document {doc_id} not found")));
    }
    Ok(Json(serde_json::json!({ "doc_id": doc_id, "updated": true })))
}

async fn delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    if !state.store.delete_document(doc_id)? {
        return Err(ApiError::NotFound(format!("document {doc_id} not found")));
    }
    Ok(Json(serde_json::json!({ "doc_id": doc_id, "deleted": true })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::Unauthorized("ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token".into()))
    }
}

fn raw_terms(q: &str) -> Vec<String> {
    q.split_whitespace().map(|s| s.to_string()).collect()
}

/// A window of the body around the first query term, terms wrapped in <em>.
fn snippet(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let lower = text.to_lowercase();
    let first_char = raw_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .find_map(|t| lower.find(&t.to_lowercase()))
        // Lowercasing can change byte lengths; map back through char counts.
        .map(|byte_idx| lower[..byte_idx].chars().count());
    let chars: Vec<char> = text.chars().collect();
    let (start, end) = match first_char {
        Some(idx) => (idx.saturating_sub(SNIPPET_CHARS / 2), (idx + SNIPPET_CHARS).min(chars.len())),
        None => (0, SNIPPET_CHARS.min(chars.len())),
    };
    let window: String = chars[start.min(end)..end].iter().collect();
    Some(highlight_terms(&window, raw_terms))
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
