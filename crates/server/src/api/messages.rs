//! Message creation: the split POST (create) / GET (stream) flow.
//!
//! POST persists the user/assistant pair and registers the background
//! agent before returning — the response carries the stream URL, and the
//! agent makes progress whether or not anyone ever opens it.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::message_store::{MessageRole, MessageStatus};
use crate::state::AppState;

use super::{bad_request, internal_error, not_found, ApiError, ErrorResponse};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MessageCreateRequest {
    /// The user message content.
    pub content: String,
    /// Opaque metadata forwarded to the agent routine.
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageCreateResponse {
    pub message_id: String,
    pub stream_url: String,
}

/// Create a message pair and start the background agent.
///
/// Returns before the agent has produced any event; open the returned
/// `stream_url` to watch progress.
#[utoipa::path(
    post,
    path = "/api/chats/{chat_id}/messages",
    tag = "Messages",
    params(("chat_id" = String, Path, description = "Chat ID")),
    request_body = MessageCreateRequest,
    responses(
        (status = 201, description = "Message created, agent started", body = MessageCreateResponse),
        (status = 400, description = "Empty content", body = ErrorResponse),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    )
)]
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Json(req): Json<MessageCreateRequest>,
) -> Result<(StatusCode, Json<MessageCreateResponse>), ApiError> {
    if req.content.trim().is_empty() {
        return Err(bad_request("Message content cannot be empty"));
    }

    let assistant_id = {
        let store = state.messages.write().await;
        let (_, assistant) = store
            .create_message_pair(&chat_id, &req.content, req.metadata.clone())
            .map_err(|e| internal_error(format!("Failed to create message: {e}")))?
            .ok_or_else(|| not_found(format!("Chat {chat_id} not found")))?;
        assistant.message_id
    };

    state.spawn_agent(&assistant_id, &chat_id, req.content, req.metadata);

    let stream_url = format!("/api/chats/{chat_id}/messages/{assistant_id}/stream");
    Ok((
        StatusCode::CREATED,
        Json(MessageCreateResponse {
            message_id: assistant_id,
            stream_url,
        }),
    ))
}

// ── Human-in-the-loop resume ─────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResumeAction {
    Accept,
    Edit,
    Respond,
    Ignore,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ResumeRequest {
    pub action: ResumeAction,
    /// Required for `edit` (replacement tool args) and `respond` (the
    /// human's answer).
    #[schema(value_type = Option<Object>)]
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ResumeResponse {
    pub message_id: String,
    pub stream_url: String,
    pub resumed_from: String,
}

/// Resume an interrupted message with human input.
///
/// Allocates a fresh assistant message whose run starts from the prior
/// interrupted state (carried in its metadata); the interrupted log stays
/// closed with its own terminal event. Returns the new stream URL.
#[utoipa::path(
    post,
    path = "/api/chats/{chat_id}/messages/{message_id}/resume",
    tag = "Messages",
    params(
        ("chat_id" = String, Path, description = "Chat ID"),
        ("message_id" = String, Path, description = "Interrupted assistant message ID")
    ),
    request_body = ResumeRequest,
    responses(
        (status = 202, description = "Resume accepted, new agent started", body = ResumeResponse),
        (status = 400, description = "Message is not interrupted or args missing", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn resume_message(
    State(state): State<Arc<AppState>>,
    Path((chat_id, message_id)): Path<(String, String)>,
    Json(req): Json<ResumeRequest>,
) -> Result<(StatusCode, Json<ResumeResponse>), ApiError> {
    if matches!(req.action, ResumeAction::Edit | ResumeAction::Respond) && req.args.is_none() {
        return Err(bad_request(format!(
            "{:?} action requires 'args'",
            req.action
        )));
    }

    let (new_message, user_content) = {
        let store = state.messages.write().await;
        let (owner_chat, interrupted) = store
            .find_message(&message_id)
            .map_err(|e| internal_error(format!("Failed to look up message: {e}")))?
            .ok_or_else(|| not_found(format!("Message {message_id} not found")))?;
        if owner_chat != chat_id {
            return Err(bad_request("Message does not belong to specified chat"));
        }
        if interrupted.role != MessageRole::Assistant
            || interrupted.status != MessageStatus::Interrupted
        {
            return Err(bad_request("Message is not interrupted"));
        }

        let user_content = store
            .user_content_before(&chat_id, interrupted.created_at)
            .map_err(|e| internal_error(format!("Failed to read chat: {e}")))?
            .ok_or_else(|| bad_request("No user message found for this response"))?;

        let mut metadata = serde_json::json!({
            "resumed_from": message_id,
            "resume_action": req.action,
        });
        if let Some(args) = &req.args {
            metadata["resume_args"] = args.clone();
        }

        let new_message = store
            .append_assistant_message(&chat_id, Some(metadata))
            .map_err(|e| internal_error(format!("Failed to create resume message: {e}")))?
            .ok_or_else(|| not_found(format!("Chat {chat_id} not found")))?;

        if let Err(e) = store.record_resumed(&message_id, &new_message.message_id) {
            tracing::warn!(message_id = %message_id, error = %e, "failed to link resumed message");
        }
        (new_message, user_content)
    };

    state.spawn_agent(
        &new_message.message_id,
        &chat_id,
        user_content,
        new_message.metadata.clone(),
    );
    tracing::info!(
        resumed_from = %message_id,
        message_id = %new_message.message_id,
        "interrupted message resumed"
    );

    let stream_url = format!(
        "/api/chats/{chat_id}/messages/{}/stream",
        new_message.message_id
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(ResumeResponse {
            message_id: new_message.message_id,
            stream_url,
            resumed_from: message_id,
        }),
    ))
}
