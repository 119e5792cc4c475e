//! Synchronous event replay (debug / polling fallback).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use relay_core::event::{seq_from_id, Event};

use crate::state::AppState;

use super::{internal_error, not_found, ApiError, ErrorResponse};

const REPLAY_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Event id to replay after; malformed values replay from the start.
    pub since: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageEventsResponse {
    pub message_id: String,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<Event>,
    pub count: usize,
}

/// Replay the persisted event log for a message.
#[utoipa::path(
    get,
    path = "/api/messages/{message_id}/events",
    tag = "Streaming",
    params(
        ("message_id" = String, Path, description = "Assistant message ID"),
        ("since" = Option<String>, Query, description = "Event ID to replay after")
    ),
    responses(
        (status = 200, description = "Ordered event log", body = MessageEventsResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn message_events(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<MessageEventsResponse>, ApiError> {
    {
        let store = state.messages.read().await;
        store
            .find_message(&message_id)
            .map_err(|e| internal_error(format!("Failed to look up message: {e}")))?
            .ok_or_else(|| not_found(format!("Message {message_id} not found")))?;
    }

    let since_seq = match query.since.as_deref() {
        None => 0,
        Some(raw) => seq_from_id(raw).unwrap_or_else(|| {
            tracing::info!(cursor = %raw, "malformed replay cursor, starting from seq 0");
            0
        }),
    };

    let events = state
        .events
        .read_since(&message_id, since_seq, REPLAY_LIMIT)
        .await
        .map_err(|e| internal_error(format!("Failed to read events: {e}")))?;

    Ok(Json(MessageEventsResponse {
        count: events.len(),
        message_id,
        events,
    }))
}
