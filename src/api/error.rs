use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::forecast::ForecastError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    message: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Forecast(e) => match e {
                ForecastError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ForecastError::UnknownCategoryCode { .. }
                | ForecastError::UnitMismatch { .. }
                | ForecastError::InsufficientData { .. }
                | ForecastError::DisjointHorizon => StatusCode::BAD_GATEWAY,
                ForecastError::EmptySeries | ForecastError::PipelineAborted(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::InternalError(_) => "InternalServerError",
            ApiError::Forecast(e) => match e {
                ForecastError::SourceUnavailable(_) => "SourceUnavailable",
                ForecastError::UnknownCategoryCode { .. } => "UnknownCategoryCode",
                ForecastError::UnitMismatch { .. } => "UnitMismatch",
                ForecastError::InsufficientData { .. } => "InsufficientData",
                ForecastError::DisjointHorizon => "DisjointHorizon",
                ForecastError::EmptySeries => "EmptySeries",
                ForecastError::PipelineAborted(_) => "PipelineAborted",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(error = %self, "weather source unavailable");
            "Weather source temporarily unavailable".to_string()
        } else if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, "API error occurred");
            "An internal error occurred".to_string()
        } else {
            tracing::debug!(error = %self, "request failed");
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: self.error_type().to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{error:#}"))
    }
}
