//! Active background agent listing.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::registry::TaskSummary;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActiveAgentsQuery {
    /// Restrict the listing to one chat.
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ActiveAgentsResponse {
    pub count: usize,
    pub agents: Vec<TaskSummary>,
}

/// List currently running background agents.
#[utoipa::path(
    get,
    path = "/api/agents/active",
    tag = "Agents",
    params(("chat_id" = Option<String>, Query, description = "Filter by chat ID")),
    responses(
        (status = 200, description = "Running agents", body = ActiveAgentsResponse)
    )
)]
pub async fn agents_active(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActiveAgentsQuery>,
) -> Json<ActiveAgentsResponse> {
    let agents = state.registry.list(query.chat_id.as_deref());
    Json(ActiveAgentsResponse {
        count: agents.len(),
        agents,
    })
}
