//! User and chat CRUD endpoints (collaborator surface around the core).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::message_store::{Chat, ChatMessage, UserRecord};
use crate::state::AppState;

use super::{internal_error, not_found, ApiError, ErrorResponse};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChatCreateRequest {
    /// Optional chat title; auto-generated (and later auto-named from the
    /// first message) when omitted.
    pub title: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ChatResponse {
    pub chat_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub message_count: usize,
}

impl From<Chat> for ChatResponse {
    fn from(chat: Chat) -> Self {
        Self {
            chat_id: chat.chat_id,
            user_id: chat.user_id,
            title: chat.title,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
            message_count: chat.messages.len(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaginatedMessages {
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<ChatMessage>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

/// Get a user, creating it on first sight.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "Chats",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User record", body = Object)
    )
)]
pub async fn get_or_create_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserRecord>, ApiError> {
    let store = state.messages.write().await;
    let user = store
        .get_or_create_user(&user_id)
        .map_err(|e| internal_error(format!("Failed to get/create user: {e}")))?;
    Ok(Json(user))
}

/// Create a new chat for a user.
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/chats",
    tag = "Chats",
    params(("user_id" = String, Path, description = "User ID")),
    request_body = ChatCreateRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatResponse)
    )
)]
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<ChatCreateRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let store = state.messages.write().await;
    store
        .get_or_create_user(&user_id)
        .map_err(|e| internal_error(format!("Failed to ensure user: {e}")))?;
    let chat = store
        .create_chat(&user_id, req.title.as_deref())
        .map_err(|e| internal_error(format!("Failed to create chat: {e}")))?;
    Ok((StatusCode::CREATED, Json(chat.into())))
}

/// Chat details including message count.
#[utoipa::path(
    get,
    path = "/api/chats/{chat_id}",
    tag = "Chats",
    params(("chat_id" = String, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Chat details", body = ChatResponse),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    )
)]
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatResponse>, ApiError> {
    let store = state.messages.read().await;
    let chat = store
        .get_chat(&chat_id)
        .map_err(|e| internal_error(format!("Failed to read chat: {e}")))?
        .ok_or_else(|| not_found(format!("Chat {chat_id} not found")))?;
    Ok(Json(chat.into()))
}

/// Paginated message history for a chat, oldest first.
#[utoipa::path(
    get,
    path = "/api/chats/{chat_id}/messages",
    tag = "Chats",
    params(
        ("chat_id" = String, Path, description = "Chat ID"),
        ("page" = Option<usize>, Query, description = "Page number (1-based)"),
        ("page_size" = Option<usize>, Query, description = "Items per page")
    ),
    responses(
        (status = 200, description = "Message history", body = PaginatedMessages),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<PaginatedMessages>, ApiError> {
    let page_size = page.page_size.clamp(1, 100);
    let store = state.messages.read().await;
    let (items, total) = store
        .list_messages(&chat_id, page.page.max(1), page_size)
        .map_err(|e| internal_error(format!("Failed to list messages: {e}")))?
        .ok_or_else(|| not_found(format!("Chat {chat_id} not found")))?;
    Ok(Json(PaginatedMessages {
        items,
        page: page.page.max(1),
        page_size,
        total,
    }))
}
