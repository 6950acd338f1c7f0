use axum::extract::{Multipart, Path, State};
use axum::Json;
use std::sync::Arc;

use parlor_shared::errors::{AppError, AppResult};
use parlor_shared::types::ApiResponse;

use crate::extract::AuthUser;
use crate::routes::check_member;
use crate::routes::form::FormData;
use crate::services::comments::{self, CommentOutcome, CommentView};
use crate::AppState;

/// POST /conversations/:id/messages/:mid/comments - multipart: content/content_type or file
pub async fn comment_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((conversation_id, message_id)): Path<(i32, i32)>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<CommentOutcome>>> {
    check_member(&state.db, &user.id, conversation_id)?;

    let mut form = FormData::read(multipart).await?;
    let content = form.message_content(&state, &user.ctx, &user.id).await?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let outcome = comments::add(&user.ctx, &mut conn, conversation_id, message_id, &user.id, content)?;

    Ok(Json(ApiResponse::ok(outcome)))
}

/// DELETE /conversations/:id/messages/:mid/comments/:cid
pub async fn uncomment_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((_conversation_id, _message_id, comment_id)): Path<(i32, i32, i32)>,
) -> AppResult<Json<ApiResponse<()>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    comments::remove(&user.ctx, &mut conn, comment_id, &user.id)?;

    Ok(Json(ApiResponse::ok_with_message((), "comment removed")))
}

/// GET /messages/:mid/comments
pub async fn list_comments(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<i32>,
) -> AppResult<Json<ApiResponse<Vec<CommentView>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let list = comments::list_for(&user.ctx, &mut conn, message_id, &user.id)?;

    Ok(Json(ApiResponse::ok(list)))
}
