// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP surface: mock backend, REST access to the data services, the
//! dashboard page and the WebSocket change feed

mod pages;
mod ws;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::context::AppContext;
use crate::feed::FeedStatus;
use crate::items::{CuratedItem, CuratedItemPatch, NewCuratedItem};
use crate::mock::{self, Agent, HealthResponse, Persona, Task};
use crate::store::RecordId;
use crate::targets::{CuratedContent, CurationInput, NewTarget, Target, TargetPatch};
use crate::workflows::{Workflow, WorkflowRun};
use crate::{AzError, Result};

type Ctx = State<Arc<AppContext>>;

/// Create the web application router
pub fn create_router(context: Arc<AppContext>) -> Router {
    let cors_permissive = context.config.web.cors_permissive;

    let router = Router::new()
        // Pages
        .route("/", get(dashboard_page))
        .route("/ws", get(ws::ws_handler))
        .route("/ws/health", get(ws_health))
        .route("/ws/status", get(ws_status))
        // Mock backend
        .route("/health", get(health))
        .route("/api/agents", get(api_agents))
        .route("/api/personas", get(api_personas))
        .route("/api/tasks", get(api_tasks).post(api_create_task))
        .route("/api/tasks/:id", get(api_task))
        .route("/api/workflows", get(api_workflows))
        .route("/api/workflows/:id/run", post(api_trigger_workflow))
        // Targets
        .route("/api/targets", get(api_list_targets).post(api_add_target))
        .route("/api/targets/refresh-candidates", get(api_refresh_candidates))
        .route(
            "/api/targets/:id",
            get(api_get_target).patch(api_update_target).delete(api_remove_target),
        )
        .route("/api/targets/:id/validate", post(api_validate_target))
        .route("/api/targets/:id/monitor", post(api_monitor_target))
        .route("/api/targets/:id/refresh", post(api_mark_refreshed))
        .route("/api/targets/:id/data", get(api_target_data).put(api_curate_target))
        // Curated items
        .route("/api/items", get(api_list_items).post(api_add_item))
        .route("/api/items/categories", get(api_item_categories))
        .route(
            "/api/items/:id",
            get(api_get_item).patch(api_update_item).delete(api_remove_item),
        )
        // Workflow runs
        .route("/api/runs", get(api_list_runs).delete(api_prune_runs))
        .route("/api/runs/:id", get(api_get_run))
        .layer(TraceLayer::new_for_http())
        .with_state(context);

    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

impl IntoResponse for AzError {
    fn into_response(self) -> Response {
        let status = match &self {
            AzError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AzError::NotFound { .. } => StatusCode::NOT_FOUND,
            AzError::Backend(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Unwrap a JSON body, reporting malformed or unexpected fields as validation errors
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AzError::validation(rejection.body_text()))
}

/// Parse an optional JSON body: no body means `null`, anything else must be valid JSON
fn optional_body(bytes: &[u8]) -> Result<serde_json::Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|e| AzError::validation(format!("Failed to parse the request body as JSON: {}", e)))
}

// === Pages ===

async fn dashboard_page(State(context): Ctx) -> Result<Html<String>> {
    pages::render_dashboard(&context).map(Html)
}

// === Mock backend ===

async fn health() -> Json<HealthResponse> {
    Json(mock::health())
}

async fn api_agents() -> Json<Vec<Agent>> {
    Json(mock::agents())
}

async fn api_personas() -> Json<Vec<Persona>> {
    Json(mock::personas())
}

async fn api_tasks() -> Json<Vec<Task>> {
    Json(mock::tasks())
}

/// Mock create: the task is echoed back, nothing is stored
async fn api_create_task(payload: std::result::Result<Json<Task>, JsonRejection>) -> Result<Json<Task>> {
    let task = body(payload)?;
    info!(task = %task.id, "Accepted mock task");
    Ok(Json(task))
}

async fn api_task(Path(id): Path<String>) -> Result<Json<Task>> {
    mock::task(&id)
        .map(Json)
        .ok_or_else(|| AzError::not_found("task", id))
}

async fn api_workflows(State(context): Ctx) -> Json<Vec<Workflow>> {
    Json(context.workflows.list_workflows().to_vec())
}

async fn api_trigger_workflow(
    State(context): Ctx,
    Path(id): Path<String>,
    payload: Bytes,
) -> Result<(StatusCode, Json<WorkflowRun>)> {
    let payload = optional_body(&payload)?;
    // The run keeps going after the handle is dropped. The response holds the
    // run as of trigger, which may already have left `pending`.
    let handle = context.workflows.trigger(&id, payload)?;
    let run = context.workflows.get_run(handle.id())?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

// === Targets ===

async fn api_list_targets(State(context): Ctx) -> Json<Vec<Target>> {
    Json(context.targets.list().records().to_vec())
}

async fn api_add_target(
    State(context): Ctx,
    payload: std::result::Result<Json<NewTarget>, JsonRejection>,
) -> Result<(StatusCode, Json<Target>)> {
    let target = context.targets.add(body(payload)?)?;
    Ok((StatusCode::CREATED, Json(target)))
}

async fn api_get_target(State(context): Ctx, Path(id): Path<String>) -> Result<Json<Target>> {
    context.targets.get(&RecordId::from(id)).map(Json)
}

async fn api_update_target(
    State(context): Ctx,
    Path(id): Path<String>,
    payload: std::result::Result<Json<TargetPatch>, JsonRejection>,
) -> Result<Json<Target>> {
    context.targets.update(&RecordId::from(id), body(payload)?).map(Json)
}

async fn api_remove_target(State(context): Ctx, Path(id): Path<String>) -> Result<Json<Target>> {
    context.targets.remove(&RecordId::from(id)).map(Json)
}

async fn api_validate_target(State(context): Ctx, Path(id): Path<String>) -> Result<Json<Target>> {
    context.targets.validate_target(&RecordId::from(id)).map(Json)
}

async fn api_monitor_target(State(context): Ctx, Path(id): Path<String>) -> Result<Json<Target>> {
    context.targets.monitor_target(&RecordId::from(id)).map(Json)
}

async fn api_mark_refreshed(State(context): Ctx, Path(id): Path<String>) -> Result<Json<Target>> {
    context.targets.mark_refreshed(&RecordId::from(id)).map(Json)
}

async fn api_refresh_candidates(State(context): Ctx) -> Json<Vec<Target>> {
    Json(context.targets.refresh_candidates())
}

async fn api_target_data(
    State(context): Ctx,
    Path(id): Path<String>,
) -> Result<Json<CuratedContent>> {
    let id = RecordId::from(id);
    context.targets.get(&id)?;
    context
        .targets
        .get_data_for_target(&id)
        .map(Json)
        .ok_or_else(|| AzError::not_found("curated content", id.as_str()))
}

async fn api_curate_target(
    State(context): Ctx,
    Path(id): Path<String>,
    payload: std::result::Result<Json<CurationInput>, JsonRejection>,
) -> Result<Json<CuratedContent>> {
    context.targets.curate(&RecordId::from(id), body(payload)?).map(Json)
}

// === Curated items ===

#[derive(Deserialize)]
struct ItemsQuery {
    q: Option<String>,
    category: Option<String>,
}

async fn api_list_items(
    State(context): Ctx,
    Query(query): Query<ItemsQuery>,
) -> Json<Vec<CuratedItem>> {
    let mut items = match query.q {
        Some(q) => context.items.search(&q),
        None => context.items.list().records().to_vec(),
    };
    if let Some(category) = query.category {
        items.retain(|item| item.category.eq_ignore_ascii_case(&category));
    }
    Json(items)
}

async fn api_item_categories(State(context): Ctx) -> Json<Vec<(String, usize)>> {
    Json(context.items.category_stats())
}

async fn api_add_item(
    State(context): Ctx,
    payload: std::result::Result<Json<NewCuratedItem>, JsonRejection>,
) -> Result<(StatusCode, Json<CuratedItem>)> {
    let item = context.items.add(body(payload)?)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn api_get_item(State(context): Ctx, Path(id): Path<String>) -> Result<Json<CuratedItem>> {
    context.items.get(&RecordId::from(id)).map(Json)
}

async fn api_update_item(
    State(context): Ctx,
    Path(id): Path<String>,
    payload: std::result::Result<Json<CuratedItemPatch>, JsonRejection>,
) -> Result<Json<CuratedItem>> {
    context.items.update(&RecordId::from(id), body(payload)?).map(Json)
}

async fn api_remove_item(State(context): Ctx, Path(id): Path<String>) -> Result<Json<CuratedItem>> {
    context.items.remove(&RecordId::from(id)).map(Json)
}

// === Workflow runs ===

async fn api_list_runs(State(context): Ctx) -> Json<Vec<WorkflowRun>> {
    Json(context.workflows.list_runs().records().to_vec())
}

async fn api_get_run(State(context): Ctx, Path(id): Path<String>) -> Result<Json<WorkflowRun>> {
    context.workflows.get_run(&RecordId::from(id)).map(Json)
}

async fn api_prune_runs(State(context): Ctx) -> Json<serde_json::Value> {
    let removed = context.workflows.prune_finished();
    Json(serde_json::json!({ "removed": removed }))
}

// === Change feed ===

async fn ws_health(State(context): Ctx) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "activeConnections": context.feed.receiver_count(),
        "timestamp": chrono::Utc::now(),
    }))
}

async fn ws_status(State(context): Ctx) -> Json<FeedStatus> {
    Json(context.feed.status())
}

/// Start the web server and run until Ctrl-C
pub async fn start_server(context: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", context.config.web.host, context.config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Dashboard available at http://{}", addr);

    let router = create_router(context);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
