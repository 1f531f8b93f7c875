use std::sync::Arc;

use agent_core::Reply;
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::dispatcher::ActionDispatcher;

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<ActionDispatcher>,
}

/// Directives arrive as raw bodies so a malformed one still gets an exception reply.
pub fn router(dispatcher: Arc<ActionDispatcher>) -> Router {
    let state = AppState { dispatcher };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/agent/directive", post(directive))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn directive(State(st): State<AppState>, body: Bytes) -> Json<Reply> {
    Json(st.dispatcher.dispatch_bytes(&body).await)
}
