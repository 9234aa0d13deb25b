use crate::state::AppState;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get};
use axum::Router;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use visitor_analytics::aggregations::{CompanyAggregate, CompanyGroup, CompanyRecord};
use visitor_analytics::date_range::RangeType;
use visitor_analytics::export::ExportError;
use visitor_analytics::filter::FilterCriteria;
use visitor_analytics::live;
use visitor_core::error::VisitorError;
use visitor_core::source::EventSource;
use visitor_core::types::VisitEvent;

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Filter criteria from the query string. A request that names no
/// `range_type` gets `filters.default_range` from config.
pub struct Criteria(pub FilterCriteria);

#[derive(Debug, Deserialize)]
struct RangeParam {
    range_type: Option<String>,
}

impl FromRequestParts<AppState> for Criteria {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let bad_request = |e: axum::extract::rejection::QueryRejection| {
            (StatusCode::BAD_REQUEST, e.body_text())
        };
        let Query(mut criteria) = Query::<FilterCriteria>::from_request_parts(parts, state)
            .await
            .map_err(bad_request)?;
        let Query(range) = Query::<RangeParam>::from_request_parts(parts, state)
            .await
            .map_err(bad_request)?;

        let named = range
            .range_type
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        if !named {
            criteria.range_type = RangeType::parse(&state.config.filters.default_range);
        }
        Ok(Criteria(criteria))
    }
}

// ── Health ──────────────────────────────────────────────────────────────

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let events = state.dashboard.read().await.working_set().len();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "events": events,
        "live": state.subscription.is_active(),
    }))
}

// ── Events ──────────────────────────────────────────────────────────────

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events", get(list_events).post(ingest_event))
        .route("/v1/events/stream", get(stream_events))
}

async fn list_events(
    State(state): State<AppState>,
    Criteria(criteria): Criteria,
) -> impl IntoResponse {
    let events = state.dashboard.read().await.filtered_events(&criteria);
    Json(events)
}

/// Insert a row as the ingestion side would. Missing `id`, `user_id` and
/// `timestamp` are filled in; the live subscription merges it.
async fn ingest_event(
    State(state): State<AppState>,
    Json(mut body): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    if !body.contains_key("id") {
        body.insert("id".into(), uuid::Uuid::new_v4().to_string().into());
    }
    if !body.contains_key("user_id") {
        body.insert("user_id".into(), state.config.user.id.clone().into());
    }
    if !body.contains_key("timestamp") {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        body.insert("timestamp".into(), now.into());
    }

    let event: VisitEvent = serde_json::from_value(Value::Object(body))
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    state
        .store
        .insert_event(event.clone())
        .await
        .map_err(internal)?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Server-sent events for every record merged into the working set.
async fn stream_events(State(state): State<AppState>) -> impl IntoResponse {
    let stream = BroadcastStream::new(state.subscription.merged())
        .filter_map(|received| received.ok())
        .map(|event| Event::default().event("visit").json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── Companies ───────────────────────────────────────────────────────────

pub fn company_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/companies", get(list_companies))
        .route("/v1/companies/{name}", get(company_details))
        .route("/v1/companies/{name}/sessions", get(company_sessions))
}

#[derive(Debug, Serialize)]
struct CompanySummary {
    #[serde(flatten)]
    company: CompanyRecord,
    visit_count: usize,
    visitor_count: usize,
    total_duration_secs: u64,
    last_visit: Option<String>,
}

impl CompanySummary {
    fn new(company: &CompanyRecord, group: Option<&CompanyGroup>) -> Self {
        Self {
            company: company.clone(),
            visit_count: group.map_or(0, CompanyGroup::visit_count),
            visitor_count: group.map_or(0, CompanyGroup::visitor_count),
            total_duration_secs: group.map_or(0, CompanyGroup::total_duration_secs),
            last_visit: group
                .and_then(CompanyGroup::last_visit)
                .map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompanyListing {
    known: usize,
    companies: Vec<CompanySummary>,
}

impl From<&CompanyAggregate> for CompanyListing {
    fn from(aggregate: &CompanyAggregate) -> Self {
        Self {
            known: aggregate.roster.len(),
            companies: aggregate
                .companies
                .iter()
                .map(|c| CompanySummary::new(c, aggregate.group(&c.company_name)))
                .collect(),
        }
    }
}

async fn list_companies(
    State(state): State<AppState>,
    Criteria(criteria): Criteria,
) -> impl IntoResponse {
    let aggregate = state.dashboard.read().await.aggregate(&criteria);
    Json(CompanyListing::from(&aggregate))
}

async fn company_details(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .dashboard
        .read()
        .await
        .company_details(&name)
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown company: {}", name)))?;
    Ok(Json(details))
}

async fn company_sessions(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Criteria(criteria): Criteria,
) -> impl IntoResponse {
    let sessions = state.dashboard.read().await.sessions_for(&name, &criteria);
    Json(sessions)
}

// ── Export ──────────────────────────────────────────────────────────────

pub fn export_routes() -> Router<AppState> {
    Router::new().route("/v1/export", get(export))
}

async fn export(
    State(state): State<AppState>,
    Criteria(criteria): Criteria,
) -> Result<impl IntoResponse, ApiError> {
    let text = {
        let dashboard = state.dashboard.read().await;
        let filtered = dashboard.filtered_events(&criteria);
        dashboard.export_text(&filtered)
    };
    let text = text.map_err(|e| match e {
        ExportError::Empty => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        other => internal(other),
    })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.config.export.file_name
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    ))
}

// ── Labels ──────────────────────────────────────────────────────────────

pub fn label_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/labels", get(list_labels))
        .route("/v1/labels/{id}", delete(delete_label))
}

async fn list_labels(State(state): State<AppState>) -> impl IntoResponse {
    let dashboard = state.dashboard.read().await;
    Json(serde_json::json!({
        "labels": dashboard.labels(),
        "options": dashboard.label_options(),
    }))
}

async fn delete_label(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_label(&id).await.map_err(|e| match e {
        VisitorError::LabelNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        other => internal(other),
    })?;
    live::refresh_labels(state.store.as_ref(), &state.config.user.id, &state.dashboard)
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}
