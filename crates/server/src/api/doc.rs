//! OpenAPI documentation aggregator.
//!
//! Collects all `#[utoipa::path]`-annotated handlers and `ToSchema`-derived
//! types into a single OpenAPI spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "relay API",
        version = "0.1.0",
        description = "Background agent execution with resumable SSE event streaming.",
    ),
    tags(
        (name = "Health", description = "Server readiness"),
        (name = "Chats", description = "User and chat CRUD around the streaming core"),
        (name = "Messages", description = "Message creation and background agent start"),
        (name = "Streaming", description = "SSE streams and event replay"),
        (name = "Agents", description = "Running background agent observability"),
    ),
    paths(
        crate::api::health::health,
        crate::api::chats::get_or_create_user,
        crate::api::chats::create_chat,
        crate::api::chats::get_chat,
        crate::api::chats::list_messages,
        crate::api::messages::create_message,
        crate::api::messages::resume_message,
        crate::api::stream::stream_message,
        crate::api::events::message_events,
        crate::api::agents::agents_active,
    ),
    components(schemas(
        crate::api::ErrorResponse,
        crate::api::health::HealthResponse,
        crate::api::chats::ChatCreateRequest,
        crate::api::chats::ChatResponse,
        crate::api::chats::PaginatedMessages,
        crate::api::messages::MessageCreateRequest,
        crate::api::messages::MessageCreateResponse,
        crate::api::messages::ResumeAction,
        crate::api::messages::ResumeRequest,
        crate::api::messages::ResumeResponse,
        crate::api::events::MessageEventsResponse,
        crate::api::agents::ActiveAgentsResponse,
        crate::registry::TaskSummary,
    ))
)]
pub struct ApiDoc;
