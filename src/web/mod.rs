pub mod handlers;

use crate::{config::ServerConfig, monitor::SafetyMonitor, utils::error::MonitorError, Result};
use axum::{
    response::Json,
    routing::{get, put},
    Router,
};
use handlers::AppState;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// 设备接口前缀
pub const DEVICE_PREFIX: &str = "/api/v1/safetymonitor/0";

pub async fn serve(monitor: Arc<SafetyMonitor>, server_config: ServerConfig) -> Result<()> {
    let app = create_app(monitor, &server_config);

    let addr: SocketAddr = server_config.bind_addr.parse().map_err(|e| {
        MonitorError::ConfigInvalid(format!(
            "Invalid bind address {}: {}",
            server_config.bind_addr, e
        ))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  {}/issafe    - Current safety verdict", DEVICE_PREFIX);
    tracing::info!("  PUT  {}/connected - Connect or disconnect", DEVICE_PREFIX);
    tracing::info!("  PUT  {}/action    - Custom action (\"status\")", DEVICE_PREFIX);
    tracing::info!("  GET  /health      - Health check");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        MonitorError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| MonitorError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(monitor: AppState, server_config: &ServerConfig) -> Router {
    let device = Router::new()
        .route("/issafe", get(handlers::is_safe_handler))
        .route(
            "/connected",
            get(handlers::get_connected_handler).put(handlers::put_connected_handler),
        )
        .route("/action", put(handlers::action_handler))
        .route("/commandblind", put(handlers::command_blind_handler))
        .route("/commandbool", put(handlers::command_bool_handler))
        .route("/commandstring", put(handlers::command_string_handler))
        .route("/supportedactions", get(handlers::supported_actions_handler))
        .route("/description", get(handlers::description_handler))
        .route("/driverinfo", get(handlers::driver_info_handler))
        .route("/driverversion", get(handlers::driver_version_handler))
        .route("/interfaceversion", get(handlers::interface_version_handler))
        .route("/name", get(handlers::name_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/config",
            get(handlers::get_config_handler).put(handlers::put_config_handler),
        );

    Router::new()
        .nest(DEVICE_PREFIX, device)
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(CorsLayer::permissive())
        .with_state(monitor)
}

/// 健康检查端点
async fn health_handler(
    axum::extract::State(monitor): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    let verdict = monitor.verdict();
    Json(json!({
        "status": "healthy",
        "connected": monitor.is_connected(),
        "is_safe": verdict.is_safe,
        "message": verdict.status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
