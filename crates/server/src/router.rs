//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/users/{user_id}", get(api::get_or_create_user))
        .route("/api/users/{user_id}/chats", post(api::create_chat))
        .route("/api/chats/{chat_id}", get(api::get_chat))
        .route(
            "/api/chats/{chat_id}/messages",
            get(api::list_messages).post(api::create_message),
        )
        .route(
            "/api/chats/{chat_id}/messages/{message_id}/stream",
            get(api::stream_message),
        )
        .route(
            "/api/chats/{chat_id}/messages/{message_id}/resume",
            post(api::resume_message),
        )
        .route("/api/messages/{message_id}/events", get(api::message_events))
        .route("/api/agents/active", get(api::agents_active))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}
