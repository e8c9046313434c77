use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use sentinel_service::runtime::StartError;
use sentinel_service::{ConfigError, StoreError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Startup failures; any of these ends the process
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Log store error: {0}")]
    Store(#[from] StoreError),
}

impl From<StartError> for AppError {
    fn from(error: StartError) -> Self {
        match error {
            StartError::Config(e) => Self::Config(e),
            StartError::Store(e) => Self::Store(e),
        }
    }
}

/// Request failures, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid limit {0:?}: expected a positive integer")]
    InvalidLimit(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidLimit(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(StoreError::Corrupt { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Log query failed");
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}
