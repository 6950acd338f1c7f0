use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::ApiResponse;

use crate::extract::AuthUser;
use crate::models::Message;
use crate::routes::check_member;
use crate::routes::form::FormData;
use crate::services::messages::{self as message_engine, DeleteOutcome, ForwardTarget};
use crate::AppState;

/// Path segment that asks for a by-name forward target in the body.
const NEW_TARGET: &str = "new";

#[derive(Debug, Deserialize, Validate)]
pub struct ForwardRequest {
    #[validate(length(min = 1, message = "target_name is required"))]
    #[serde(alias = "target_username")]
    pub target_name: String,
}

/// POST /conversations/:id/messages - multipart: content/content_type or file, optional reply_to
pub async fn send_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Message>>> {
    check_member(&state.db, &user.id, conversation_id)?;

    let mut form = FormData::read(multipart).await?;
    let reply_to = message_engine::parse_reply_to(form.text("reply_to"));
    let content = form.message_content(&state, &user.ctx, &user.id).await?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let message = message_engine::send(&user.ctx, &mut conn, conversation_id, &user.id, content, reply_to)?;

    Ok(Json(ApiResponse::ok(message)))
}

/// DELETE /conversations/:id/messages/:mid - comments on the message are reposted as messages
pub async fn delete_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((conversation_id, message_id)): Path<(i32, i32)>,
) -> AppResult<Json<ApiResponse<DeleteOutcome>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let outcome = message_engine::delete(
        &user.ctx,
        &mut conn,
        conversation_id,
        message_id,
        &user.id,
        state.config.delete_policy(),
    )?;

    Ok(Json(ApiResponse::ok_with_message(outcome, "message deleted")))
}

/// POST /conversations/:id/messages/:mid/forward/:target
///
/// `:target` is a conversation id, or `new` with `{"target_name": ...}` naming
/// a group or a user.
pub async fn forward_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((conversation_id, message_id, target)): Path<(i32, i32, String)>,
    body: Option<Json<ForwardRequest>>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let target = if target == NEW_TARGET {
        let Json(req) =
            body.ok_or_else(|| AppError::new(ErrorCode::ValidationError, "target_name is required"))?;
        req.validate()
            .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
        ForwardTarget::ByName(req.target_name)
    } else {
        let id = target
            .parse::<i32>()
            .map_err(|_| AppError::new(ErrorCode::BadRequest, "target must be a conversation id or 'new'"))?;
        ForwardTarget::Conversation(id)
    };

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let message = message_engine::forward(&user.ctx, &mut conn, conversation_id, message_id, &user.id, target)?;

    Ok(Json(ApiResponse::ok_with_message(message, "message forwarded")))
}
