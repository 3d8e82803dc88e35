//! Axum JSON API over the query service, including the tool surface over
//! HTTP. Handlers only (de)serialize; upstream unavailability never turns
//! into a 5xx here.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cnb_cache::QueryService;
use cnb_core::CompetitionStatus;
use cnb_tools::ToolError;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
}

impl AppState {
    pub fn new(query: QueryService) -> Self {
        Self { query }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RegionQuery {
    status: Option<CompetitionStatus>,
    search: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchQuery {
    #[serde(default)]
    open_only: bool,
}

#[derive(Debug, Deserialize)]
struct ToolCallBody {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/regions", get(list_regions_handler))
        .route("/regions/{code}", get(region_handler))
        .route("/stats/global", get(global_stats_handler))
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/call", post(tool_call_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env(state: AppState) -> anyhow::Result<()> {
    let port: u16 = std::env::var("CNB_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving query api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn list_regions_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.query.list_regions()).into_response()
}

async fn region_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(code): AxumPath<String>,
    Query(query): Query<RegionQuery>,
) -> Response {
    let Some(region) = cnb_core::region_by_code(&code) else {
        return not_found(&code);
    };
    // One cache read: the filtered list and the metadata describe the same
    // snapshot version even while a refresh is landing.
    let Some(view) = state
        .query
        .region_view(region.code, query.status, query.search.as_deref())
    else {
        return not_found(&code);
    };

    // Totals describe the whole region, independent of any filters.
    let open = view
        .snapshot
        .records
        .iter()
        .filter(|r| r.status == CompetitionStatus::Open)
        .count();
    Json(json!({
        "region": region.name,
        "region_code": region.code,
        "competitions": view.records,
        "total_open": open,
        "total_scheduled": view.snapshot.records.len() - open,
        "last_success_at": view.snapshot.last_success_at,
        "last_attempt_at": view.snapshot.last_attempt_at,
        "last_error": view.snapshot.last_error,
    }))
    .into_response()
}

async fn global_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.query.global_stats()).into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.query.health_summary()).into_response()
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    Json(state.query.search_all(query.open_only)).into_response()
}

async fn list_tools_handler() -> Response {
    Json(cnb_tools::list_tools()).into_response()
}

async fn tool_call_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ToolCallBody>,
) -> Response {
    match cnb_tools::dispatch(&state.query, &body.name, &body.arguments) {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(err) => {
            let status = match &err {
                ToolError::UnknownTool(_) | ToolError::UnknownRegion(_) => StatusCode::NOT_FOUND,
                ToolError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
            };
            (status, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}

fn not_found(code: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("region '{code}' not found") })),
    )
        .into_response()
}
