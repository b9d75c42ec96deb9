use crate::completion::CompletionError;
use crate::types::*;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat_handler))
        .route("/context", get(context_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ptt-chat",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    info!("Processing chat message: {}", request.message);

    match state.chat.handle_message(&request.message).await {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(CompletionError::Refused(refusal)) => {
            warn!("Completion refused: {}", refusal);
            (StatusCode::BAD_REQUEST, Json(RefusalResponse { refusal })).into_response()
        }
        Err(e) => {
            error!("Completion error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn context_handler(State(state): State<Arc<AppState>>) -> Json<ContextResponse> {
    Json(ContextResponse {
        pending_query: state.shared.pending_query(),
        cached_urls: state.shared.cached_urls(),
    })
}
