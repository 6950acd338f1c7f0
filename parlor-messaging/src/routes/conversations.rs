use axum::extract::{Multipart, Path, State};
use axum::Json;
use std::sync::Arc;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::ApiResponse;

use crate::extract::AuthUser;
use crate::models::Conversation;
use crate::routes::check_member;
use crate::routes::form::FormData;
use crate::services::conversations as conversation_store;
use crate::services::messages::{self as message_engine, ConversationDetail};
use crate::AppState;

/// GET /conversations/:id - header plus the full message history
pub async fn get_conversation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i32>,
) -> AppResult<Json<ApiResponse<ConversationDetail>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let detail = message_engine::get(&user.ctx, &mut conn, conversation_id, &user.id)?;

    Ok(Json(ApiResponse::ok(detail)))
}

/// PUT /conversations/:id/set-group-photo - multipart with a `photo` part
pub async fn set_group_photo(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    // refuse outsiders before anything touches storage
    check_member(&state.db, &user.id, conversation_id)?;

    let mut form = FormData::read(multipart).await?;
    let photo = form
        .store_image("photo", &state, &user.ctx, &user.id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "photo is required"))?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let group = conversation_store::set_photo(&user.ctx, &mut conn, conversation_id, &user.id, &photo)?;

    Ok(Json(ApiResponse::ok_with_message(group, "group photo updated")))
}
