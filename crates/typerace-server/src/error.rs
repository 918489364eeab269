use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failures surfaced by the REST layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Already in queue")]
    AlreadyInQueue,
    #[error("Already in an active match")]
    AlreadyInMatch,
    #[error("Not in queue")]
    NotInQueue,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Storage error")]
    Storage(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Storage(err) = &self {
            error!("storage failure: {}", err);
        }
        let status = match &self {
            ApiError::Unauthenticated
            | ApiError::AlreadyInQueue
            | ApiError::AlreadyInMatch => StatusCode::CONFLICT,
            ApiError::NotInQueue | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
