use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Image load failed: {0}")]
    ImageLoad(String),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Classifier unavailable")]
    ClassifierUnavailable,

    #[error("Classification failed: {0}")]
    ClassifierInvocation(String),

    #[error("classification timed out after {}s", .0.as_secs())]
    ClassifierTimeout(Duration),

    #[error("model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MonitorError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
            MonitorError::Json(_) => StatusCode::BAD_REQUEST,
            MonitorError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            MonitorError::ModelNotFound(_) | MonitorError::ModelLoad(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            MonitorError::ClassifierUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            MonitorError::ClassifierTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            MonitorError::ImageLoad(_) => "IMAGE_LOAD_ERROR",
            MonitorError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            MonitorError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            MonitorError::ClassifierUnavailable => "CLASSIFIER_UNAVAILABLE",
            MonitorError::ClassifierInvocation(_) => "CLASSIFIER_ERROR",
            MonitorError::ClassifierTimeout(_) => "CLASSIFIER_TIMEOUT",
            MonitorError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            MonitorError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            MonitorError::ConfigInvalid(_) => "CONFIG_INVALID",
            MonitorError::NotImplemented(_) => "NOT_IMPLEMENTED",
            MonitorError::Io(_) => "IO_ERROR",
            MonitorError::Json(_) => "JSON_ERROR",
            MonitorError::Ort(_) => "ORT_ERROR",
            MonitorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否属于图像加载类错误（缺失或损坏的图像源）
    pub fn is_image_load(&self) -> bool {
        matches!(self, MonitorError::ImageLoad(_) | MonitorError::ImageDecode(_))
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        tracing::error!("Request failed: {} ({})", self, status);

        (status, axum::Json(error_response)).into_response()
    }
}
