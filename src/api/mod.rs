use axum::Json;
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chat::dto::Update;
use crate::commands::{CommandHandler, Reply};
use crate::error::AppError;
use crate::models::ChatIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub chat_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentBody {
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentBody>,
}

impl From<Reply> for CommandResponse {
    fn from(reply: Reply) -> Self {
        Self {
            text: reply.text,
            attachment: reply.attachment.map(|a| AttachmentBody {
                file_name: a.file_name,
                content_base64: STANDARD.encode(a.bytes),
            }),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/commands", post(run_command))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn run_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".to_string()));
    }
    let identity = ChatIdentity {
        chat_id: req.chat_id,
        username: req.username,
        first_name: req.first_name,
        last_name: req.last_name,
    };
    let reply = CommandHandler::new(state).handle(&identity, &req.text).await;
    Ok(Json(reply.into()))
}

/// Answers a Telegram update through the chat gateway; always acknowledges with 200.
async fn telegram_webhook(
    State(state): State<AppState>,
    Json(update): Json<Update>,
) -> StatusCode {
    let Some(message) = update.message else {
        debug!("ignoring update {} without a message", update.update_id);
        return StatusCode::OK;
    };
    let Some(text) = message.text.as_deref().filter(|t| t.trim_start().starts_with('/')) else {
        return StatusCode::OK;
    };

    let identity = message.identity();
    let chat = state.chat.clone();
    let reply = CommandHandler::new(state).handle(&identity, text).await;

    if let Err(e) = chat.send_message(identity.chat_id, &reply.text).await {
        warn!("reply to chat {} failed: {}", identity.chat_id, e);
    }
    if let Some(attachment) = reply.attachment {
        if let Err(e) = chat
            .send_document(identity.chat_id, &attachment.file_name, attachment.bytes, None)
            .await
        {
            warn!("attachment to chat {} failed: {}", identity.chat_id, e);
        }
    }
    StatusCode::OK
}
