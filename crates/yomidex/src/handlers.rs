use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use yomidex_types::{Frequency, Record, Tag};

use crate::catalog::{Catalog, LoadError, Snapshot};
use crate::filter::SearchFilter;
use crate::index::{DEFAULT_SUGGESTION_LIMIT, MatchMode};
use crate::thumbs::ThumbnailStore;

const DEFAULT_PAGE_SIZE: usize = 50;
const PAGE_CACHE: &str = "public, max-age=3600";
// Read routes change on every reload and as thumbnails arrive.
const API_CACHE: &str = "no-cache";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub thumbnails: ThumbnailStore,
    pub max_page_size: usize,
    pub disable_cache: bool,
}

#[derive(Deserialize)]
pub struct RecordsQuery {
    pub min: Option<u8>,
    pub max: Option<u8>,
    pub tags: Option<String>,
    pub q: Option<String>,
    pub mode: Option<MatchMode>,
    pub commit: Option<bool>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Deserialize)]
pub struct SuggestQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub mode: Option<MatchMode>,
}

#[derive(Deserialize)]
pub struct ExactQuery {
    pub q: String,
}

#[derive(Serialize)]
struct RecordItem<'a> {
    #[serde(flatten)]
    record: &'a Record,
    secondary_lines: Vec<String>,
    thumbnail: Option<String>,
}

#[derive(Serialize)]
struct RecordsResponse<'a> {
    generation: u64,
    total: usize,
    page: usize,
    page_size: usize,
    has_more: bool,
    selected: &'a [String],
    query: &'a str,
    mode: MatchMode,
    items: Vec<RecordItem<'a>>,
}

#[derive(Serialize)]
struct TagsResponse<'a> {
    generation: u64,
    total: usize,
    items: Vec<&'a Tag>,
}

#[derive(Serialize)]
struct ReadingCounts {
    annotated: usize,
    dictionary: usize,
    segmented: usize,
    analyzer: usize,
    unresolved: usize,
}

#[derive(Serialize)]
struct StatusResponse {
    source: String,
    generation: u64,
    records: usize,
    tags: usize,
    readings: ReadingCounts,
    analyzer: &'static str,
    thumbnails: usize,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(frontend))
        .route("/healthz", get(healthz))
        .route("/v1/status", get(status))
        .route("/v1/records", get(records))
        .route("/v1/tags", get(tags))
        .route("/v1/tags/suggest", get(suggest))
        .route("/v1/tags/exact", get(exact))
        .route("/v1/reload", post(reload))
        .with_state(state)
}

/// Reload the catalog and queue thumbnail lookups for the new snapshot.
pub async fn reload_and_enrich(state: &AppState) -> Result<Arc<Snapshot>, LoadError> {
    let snapshot = state.catalog.reload().await?;
    if state.thumbnails.is_enabled() {
        drop(state.thumbnails.spawn_enrichment(snapshot.source_urls()));
    }
    Ok(snapshot)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn frontend(State(state): State<AppState>) -> Response {
    with_cache(&state, PAGE_CACHE, Html(index_html()))
}

async fn status(State(state): State<AppState>) -> Response {
    let snapshot = state.catalog.snapshot();
    let readings = snapshot.readings;
    Json(StatusResponse {
        source: state.catalog.source().to_string(),
        generation: snapshot.generation,
        records: snapshot.records.len(),
        tags: snapshot.index.len(),
        readings: ReadingCounts {
            annotated: readings.annotated,
            dictionary: readings.dictionary,
            segmented: readings.segmented,
            analyzer: readings.analyzed,
            unresolved: readings.unresolved,
        },
        analyzer: state.catalog.resolver().analyzer().state(),
        thumbnails: state.thumbnails.resolved(),
        message: state.catalog.status(),
    })
    .into_response()
}

async fn records(
    State(state): State<AppState>,
    Query(params): Query<RecordsQuery>,
) -> Result<Response, ApiError> {
    let min = frequency_bound("min", params.min.unwrap_or(Frequency::MIN))?;
    let max = frequency_bound("max", params.max.unwrap_or(Frequency::MAX))?;
    let (page, page_size) = paging(&state, params.page, params.page_size)?;

    let snapshot = state.catalog.snapshot();
    let selected = params
        .tags
        .as_deref()
        .map(|raw| raw.split([',', '、']).collect::<Vec<_>>())
        .unwrap_or_default();
    let mut filter = SearchFilter::new(min, max)
        .with_selected(selected)
        .with_query(params.q.as_deref().unwrap_or_default())
        .with_mode(params.mode.unwrap_or_default());
    if params.commit.unwrap_or(false) {
        filter = filter.commit(&snapshot.index);
    }

    let matched = filter.apply(&snapshot.records);
    let total = matched.len();
    let offset = (page - 1).saturating_mul(page_size);
    let items = matched
        .into_iter()
        .skip(offset)
        .take(page_size)
        .map(|record| RecordItem {
            record,
            secondary_lines: record.secondary_lines(),
            thumbnail: record
                .source_url
                .as_deref()
                .and_then(|url| state.thumbnails.get(url)),
        })
        .collect();

    let response = RecordsResponse {
        generation: snapshot.generation,
        total,
        page,
        page_size,
        has_more: page.saturating_mul(page_size) < total,
        selected: filter.selected(),
        query: filter.query(),
        mode: filter.mode(),
        items,
    };
    Ok(with_cache(&state, API_CACHE, Json(response)))
}

async fn tags(State(state): State<AppState>) -> Response {
    let snapshot = state.catalog.snapshot();
    let response = TagsResponse {
        generation: snapshot.generation,
        total: snapshot.index.len(),
        items: snapshot.index.tags().iter().collect(),
    };
    with_cache(&state, API_CACHE, Json(response))
}

async fn suggest(
    State(state): State<AppState>,
    Query(params): Query<SuggestQuery>,
) -> Result<Response, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT);
    if limit == 0 {
        return Err(ApiError::bad_request("limit must be >= 1"));
    }
    let limit = limit.min(state.max_page_size);

    let snapshot = state.catalog.snapshot();
    let query = params.q.unwrap_or_default();
    let items = snapshot
        .index
        .candidates(&query, limit, params.mode.unwrap_or_default());
    let response = TagsResponse {
        generation: snapshot.generation,
        total: items.len(),
        items,
    };
    Ok(with_cache(&state, API_CACHE, Json(response)))
}

async fn exact(
    State(state): State<AppState>,
    Query(params): Query<ExactQuery>,
) -> Result<Response, ApiError> {
    let snapshot = state.catalog.snapshot();
    let tag = snapshot
        .index
        .find_exact(&params.q)
        .ok_or_else(|| ApiError::NotFound(format!("no tag matches {:?}", params.q.trim())))?;
    Ok(with_cache(&state, API_CACHE, Json(tag)))
}

async fn reload(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = reload_and_enrich(&state).await.map_err(|err| match err {
        LoadError::Source(source) => ApiError::Upstream(source.to_string()),
        superseded @ LoadError::Superseded { .. } => ApiError::Conflict(superseded.to_string()),
    })?;
    let body = json!({
        "generation": snapshot.generation,
        "records": snapshot.records.len(),
        "tags": snapshot.index.len(),
        "message": state.catalog.status(),
    });
    Ok(Json(body).into_response())
}

fn frequency_bound(name: &str, value: u8) -> Result<u8, ApiError> {
    Frequency::new(value).map(Frequency::get).ok_or_else(|| {
        ApiError::bad_request(format!(
            "{name} must be between {} and {}",
            Frequency::MIN,
            Frequency::MAX
        ))
    })
}

fn paging(
    state: &AppState,
    page: Option<usize>,
    page_size: Option<usize>,
) -> Result<(usize, usize), ApiError> {
    let page = page.unwrap_or(1);
    if page == 0 {
        return Err(ApiError::bad_request("page must be >= 1"));
    }
    let mut page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err(ApiError::bad_request("page_size must be >= 1"));
    }
    if page_size > state.max_page_size {
        page_size = state.max_page_size;
    }
    Ok((page, page_size))
}

fn with_cache(state: &AppState, policy: &'static str, body: impl IntoResponse) -> Response {
    if state.disable_cache {
        return body.into_response();
    }
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static(policy))],
        body,
    )
        .into_response()
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

const BASE_HTML: &str = include_str!("../templates/base.html");
const STYLE_HTML: &str = include_str!("../templates/style.html");
const VIEWER_BODY_HTML: &str = include_str!("../templates/viewer_body.html");
const VIEWER_SCRIPT: &str = include_str!("../templates/viewer_script.js");

fn render_page(title: &str, body: &str, script: &str) -> String {
    BASE_HTML
        .replace("{{title}}", title)
        .replace("{{style}}", STYLE_HTML)
        .replace("{{body}}", body)
        .replace("{{scripts}}", &format!(r#"<script>{script}</script>"#))
        .replace("__SUGGEST_LIMIT__", &DEFAULT_SUGGESTION_LIMIT.to_string())
}

fn index_html() -> String {
    render_page("Yomidex", VIEWER_BODY_HTML, VIEWER_SCRIPT)
}
