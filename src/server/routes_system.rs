use crate::server::error::AppError;
use crate::server::AppContext;
use axum::{extract::State, routing::get, Extension, Json, Router};
use convertforge_common::RequestId;
use convertforge_engine::{check_tools, ToolInfo, TargetFormat};
use serde::Serialize;

pub fn system_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/formats", get(formats_handler))
        .route("/tools", get(tools_handler))
        .route("/system", get(system_handler))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_secs: u64,
    pub version: &'static str,
    pub request_id: RequestId,
}

pub async fn health_handler(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now(),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        request_id,
    })
}

/// Host and process facts for monitoring.
#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub platform: &'static str,
    pub arch: &'static str,
    pub version: &'static str,
    pub pid: u32,
    pub cpus: usize,
    pub uptime_secs: u64,
    pub event_subscribers: usize,
    pub request_id: RequestId,
}

pub async fn system_handler(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
) -> Json<SystemInfo> {
    Json(SystemInfo {
        platform: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        version: env!("CARGO_PKG_VERSION"),
        pid: std::process::id(),
        cpus: std::thread::available_parallelism().map_or(1, |n| n.get()),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        event_subscribers: ctx.events.subscriber_count(),
        request_id,
    })
}

/// One row of the conversion table as exposed over HTTP.
#[derive(Debug, Serialize)]
pub struct FormatEntry {
    pub target: TargetFormat,
    pub sources: &'static [&'static str],
    pub tool: &'static str,
    pub timeout_secs: u64,
}

/// Flatten the conversion table.
pub fn format_entries() -> Vec<FormatEntry> {
    TargetFormat::ALL
        .into_iter()
        .flat_map(|target| {
            target.rules().iter().map(move |rule| FormatEntry {
                target,
                sources: rule.sources,
                tool: rule.tool.name(),
                timeout_secs: rule.timeout_secs,
            })
        })
        .collect()
}

pub async fn formats_handler() -> Json<Vec<FormatEntry>> {
    Json(format_entries())
}

pub async fn tools_handler(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<ToolInfo>>, AppError> {
    let paths = ctx.orchestrator.tools().clone();
    let infos = tokio::task::spawn_blocking(move || check_tools(&paths))
        .await
        .map_err(|e| {
            AppError::internal(format!("tool check failed: {e}")).with_request_id(request_id)
        })?;
    Ok(Json(infos))
}
