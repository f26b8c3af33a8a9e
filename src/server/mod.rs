use crate::config::Config;
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware,
    response::IntoResponse,
    Extension, Json, Router,
};
use convertforge_common::RequestId;
use convertforge_engine::{ConversionOrchestrator, EventBus, Workspace};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod request_id;
pub mod routes_convert;
pub mod routes_sse;
pub mod routes_system;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub orchestrator: Arc<ConversionOrchestrator>,
    pub events: Arc<EventBus>,
    pub started_at: Instant,
}

impl AppContext {
    /// Wire the engine from configuration. Does not touch the filesystem.
    pub fn from_config(config: Config) -> Self {
        let events = Arc::new(EventBus::default());
        let workspace = Workspace::new(&config.storage.uploads_dir, &config.storage.output_dir);
        let orchestrator = ConversionOrchestrator::new(workspace, config.engine_settings())
            .with_tools(config.tools.clone())
            .with_events(Arc::clone(&events));

        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            events,
            started_at: Instant::now(),
        }
    }

    /// Create the working directories and sweep files a previous process left
    /// behind.
    pub async fn prepare(&self) -> Result<()> {
        let workspace = self.orchestrator.workspace();
        workspace
            .ensure()
            .await
            .context("Failed to create upload/output directories")?;

        let max_age = Duration::from_secs(self.config.cleanup.sweep_max_age_secs);
        for dir in [workspace.uploads_dir(), workspace.output_dir()] {
            if let Err(e) = self.orchestrator.cleanup().sweep(dir, max_age).await {
                tracing::warn!("Startup sweep of {:?} failed: {}", dir, e);
            }
        }
        Ok(())
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = cors_layer(&ctx.config.server.allowed_origins);
    let body_limit = ctx.config.server.max_upload_bytes;

    Router::new()
        .nest("/api", api_routes())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .with_state(ctx)
}

fn api_routes() -> Router<AppContext> {
    routes_convert::convert_routes()
        .merge(routes_system::system_routes())
        .merge(routes_sse::sse_routes())
}

async fn not_found(
    method: Method,
    uri: Uri,
    request_id: Option<Extension<RequestId>>,
) -> impl IntoResponse {
    let request_id = request_id.map(|Extension(id)| id);
    tracing::warn!(%method, path = uri.path(), "endpoint not found");
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Endpoint not found",
            "request_id": request_id,
        })),
    )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let layer = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    layer
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, request_id::X_REQUEST_ID.clone()])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            request_id::X_REQUEST_ID.clone(),
            HeaderName::from_static(routes_convert::X_PROCESSING_TIME_MS),
        ])
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::from_config(config);
    ctx.prepare().await?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
