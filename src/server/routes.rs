//! HTTP route handlers for the Aurora chat API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::chat::error::ChatError;
use crate::chat::types::{Conversation, ConversationId, Message, Role};

use super::state::AppState;

/// Error payload returned by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable failure description.
    pub error: String,
}

/// Status code plus JSON error payload.
type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a chat error onto its HTTP response.
fn api_error(err: ChatError) -> ApiError {
    let status = match &err {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/api/conversations/{id}", delete(delete_conversation))
        .route("/api/conversations/{id}/messages", get(list_messages))
        .route("/api/conversations/{id}/title", put(rename_conversation))
        .route("/api/chat", post(submit_chat))
        .fallback_service(ServeDir::new("static"))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "aurora-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Conversation summary returned by the conversation routes.
#[derive(Debug, Serialize)]
pub struct ConversationDto {
    /// Store-assigned identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
}

impl From<Conversation> for ConversationDto {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title,
        }
    }
}

/// One message as returned by the history route.
#[derive(Debug, Serialize)]
pub struct MessageDto {
    /// Author of the turn.
    pub role: Role,
    /// Message text.
    pub body: String,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            role: m.role,
            body: m.body,
        }
    }
}

/// Handle conversation creation.
async fn create_conversation(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ConversationDto>), ApiError> {
    let conversation = state
        .service
        .create_conversation()
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(conversation.into())))
}

/// List all conversations, most recent first.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConversationDto>>, ApiError> {
    let conversations = state
        .service
        .list_conversations()
        .await
        .map_err(api_error)?;

    Ok(Json(
        conversations.into_iter().map(ConversationDto::from).collect(),
    ))
}

/// List the messages of a conversation in insertion order.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let messages = state.service.list_messages(id).await.map_err(api_error)?;

    Ok(Json(messages.into_iter().map(MessageDto::from).collect()))
}

/// Chat exchange request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// The user's message.
    pub message: String,
}

/// Chat exchange response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The assistant's reply.
    pub reply: String,
}

/// Handle one chat exchange.
async fn submit_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .service
        .submit_exchange(request.conversation_id, &request.message)
        .await
        .map_err(api_error)?;

    Ok(Json(ChatResponse { reply }))
}

/// Rename request.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// New conversation title.
    pub title: String,
}

/// Success flag returned by mutation routes.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    /// Whether the operation completed.
    pub success: bool,
}

/// Handle conversation renaming.
async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .service
        .rename_conversation(id, &request.title)
        .await
        .map_err(api_error)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Handle conversation deletion (cascades to messages).
async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .service
        .delete_conversation(id)
        .await
        .map_err(api_error)?;

    Ok(Json(SuccessResponse { success: true }))
}
