use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::handoff::HandoffError;

/// Why a move request failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The client sent something we cannot use.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("position has no legal moves")]
    NoLegalMove,
    #[error("engine error: {0:#}")]
    Engine(#[from] anyhow::Error),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NoLegalMove => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Engine(_) | ServiceError::Handoff(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
