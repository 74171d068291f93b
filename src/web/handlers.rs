use crate::{config::MonitorConfig, monitor::SafetyMonitor, utils::error::MonitorError, Result};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type AppState = Arc<SafetyMonitor>;

/// JSON响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub value: T,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(value: T) -> Self {
        Self {
            success: true,
            value,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>>;

fn ok<T>(value: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(value)))
}

#[derive(Debug, Deserialize)]
pub struct ConnectedRequest {
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub parameters: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub raw: bool,
}

pub async fn is_safe_handler(State(monitor): State<AppState>) -> ApiResult<bool> {
    ok(monitor.is_safe())
}

pub async fn status_handler(State(monitor): State<AppState>) -> ApiResult<String> {
    ok(monitor.status())
}

pub async fn get_connected_handler(State(monitor): State<AppState>) -> ApiResult<bool> {
    ok(monitor.is_connected())
}

/// 连接会加载模型，放到阻塞线程执行
pub async fn put_connected_handler(
    State(monitor): State<AppState>,
    Json(request): Json<ConnectedRequest>,
) -> ApiResult<bool> {
    tracing::info!("Host requested connected={}", request.connected);

    let worker = Arc::clone(&monitor);
    tokio::task::spawn_blocking(move || worker.set_connected(request.connected))
        .await
        .map_err(|e| MonitorError::Internal(format!("connect task failed: {}", e)))??;

    ok(monitor.is_connected())
}

pub async fn action_handler(
    State(monitor): State<AppState>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<String> {
    tracing::debug!("Action requested: {}", request.action);
    ok(monitor.action(&request.action, &request.parameters)?)
}

pub async fn command_blind_handler(
    State(monitor): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<()> {
    ok(monitor.command_blind(&request.command, request.raw)?)
}

pub async fn command_bool_handler(
    State(monitor): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<bool> {
    ok(monitor.command_bool(&request.command, request.raw)?)
}

pub async fn command_string_handler(
    State(monitor): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<String> {
    ok(monitor.command_string(&request.command, request.raw)?)
}

pub async fn supported_actions_handler(State(monitor): State<AppState>) -> ApiResult<Vec<String>> {
    ok(monitor.supported_actions())
}

pub async fn description_handler(State(monitor): State<AppState>) -> ApiResult<&'static str> {
    ok(monitor.description())
}

pub async fn driver_info_handler(State(monitor): State<AppState>) -> ApiResult<String> {
    ok(monitor.driver_info())
}

pub async fn driver_version_handler(State(monitor): State<AppState>) -> ApiResult<&'static str> {
    ok(monitor.driver_version())
}

pub async fn interface_version_handler(State(monitor): State<AppState>) -> ApiResult<i16> {
    ok(monitor.interface_version())
}

pub async fn name_handler(State(monitor): State<AppState>) -> ApiResult<&'static str> {
    ok(monitor.name())
}

pub async fn get_config_handler(State(monitor): State<AppState>) -> ApiResult<MonitorConfig> {
    ok(monitor.config()?)
}

pub async fn put_config_handler(
    State(monitor): State<AppState>,
    Json(config): Json<MonitorConfig>,
) -> ApiResult<MonitorConfig> {
    ok(monitor.update_config(config)?)
}
