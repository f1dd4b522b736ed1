use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::rate_limit::RateLimitResult;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Too Many Requests")]
    RateLimited(RateLimitResult),
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("Internal Server Error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Body rejections share the envelope and never echo the schema
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected request body");
        ApiError::BadRequest("Invalid request data".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::InternalError(msg) => msg.clone(),
            ApiError::RateLimited(_) => "Rate limit exceeded. Try again later.".to_string(),
            ApiError::Upstream(_) => "AI provider request failed".to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({ "error": message }));
        match self {
            ApiError::RateLimited(result) => (status, result.headers(), body).into_response(),
            _ => (status, body).into_response(),
        }
    }
}
