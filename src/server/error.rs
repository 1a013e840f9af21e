use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::agent::AgentError;

/// Failures that end a chat request before any answer bytes are sent.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Agent(AgentError::Retrieval(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Agent(AgentError::Generation(_)) => StatusCode::BAD_GATEWAY,
        };
        error!("Chat request failed with {}: {}", status, self);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
