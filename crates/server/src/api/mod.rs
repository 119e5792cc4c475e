//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area. Shared response
//! types and error helpers live here in mod.rs.

mod agents;
mod chats;
pub(crate) mod doc;
mod events;
mod health;
mod messages;
mod stream;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// ── Re-exports ───────────────────────────────────────────────────
// Preserves flat `api::foo` import paths used by router.rs.

pub use agents::agents_active;
pub use chats::{create_chat, get_chat, get_or_create_user, list_messages};
pub use events::message_events;
pub use health::health;
pub use messages::{create_message, resume_message};
pub use stream::stream_message;
