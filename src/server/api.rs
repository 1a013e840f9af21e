use crate::agent::ChatAgent;
use crate::models::chat::ChatRequest;
use crate::models::stream::StreamProtocol;
use crate::server::error::ApiError;
use crate::server::relay::relay_response;

use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    extract::State,
    response::Response,
    Json,
};
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use uuid::Uuid;
use log::info;

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub protocol: StreamProtocol,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    info!("[{}] Chat request with {} turn(s)", request_id, req.messages.len());

    let tokens = state.agent.respond(req.messages).await?;
    Ok(relay_response(tokens, state.protocol, request_id))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.agent.model(),
    })
}
