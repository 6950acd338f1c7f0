use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::ApiResponse;

use crate::extract::AuthUser;
use crate::models::{Conversation, Message, User};
use crate::routes::form::FormData;
use crate::services::conversations::{self as conversation_store, ConversationSummary};
use crate::services::identity::{self, UserSearchResult};
use crate::services::messages as message_engine;
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct RenameRequest {
    #[validate(length(min = 1, message = "new name is required"))]
    #[serde(alias = "newname")]
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecipientQuery {
    pub recipient_username: Option<String>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct FirstMessageResponse {
    pub conversation: Conversation,
    pub message: Message,
}

fn require_self(user: &AuthUser, path_id: &str) -> AppResult<()> {
    if user.id == path_id {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::Forbidden, "cannot act on behalf of another user"))
    }
}

// --- Handlers ---

/// PUT /users/me/username
pub async fn set_my_username(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RenameRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let updated = identity::rename(&user.ctx, &mut conn, &user.id, &req.new_name)?;

    Ok(Json(ApiResponse::ok_with_message(updated, "username updated")))
}

/// PUT /users/me/photo - multipart with a `photo` part
pub async fn set_my_photo(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut form = FormData::read(multipart).await?;
    let photo = form
        .store_image("photo", &state, &user.ctx, &user.id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "photo is required"))?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let updated = identity::set_photo(&user.ctx, &mut conn, &user.id, &photo)?;

    Ok(Json(ApiResponse::ok_with_message(updated, "photo updated")))
}

/// GET /users/:id
pub async fn get_user(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let found = identity::get(&user.ctx, &mut conn, &user_id)?;

    Ok(Json(ApiResponse::ok(found)))
}

/// GET /search/users?username=
pub async fn search_user(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<UserSearchResult>>> {
    let username = query
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "username query parameter is required"))?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let result = identity::search(&user.ctx, &mut conn, &user.id, &username)?;

    Ok(Json(ApiResponse::ok(result)))
}

/// GET /users/:id/conversations - conversation list, most recently active first
pub async fn list_conversations(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<ConversationSummary>>>> {
    require_self(&user, &user_id)?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let list = conversation_store::list_for_user(&user.ctx, &mut conn, &user.id)?;

    Ok(Json(ApiResponse::ok(list)))
}

/// POST /users/:id/conversations/first-message - multipart: recipient_username, content/content_type or file
pub async fn send_first_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<RecipientQuery>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<FirstMessageResponse>>> {
    require_self(&user, &user_id)?;

    let mut form = FormData::read(multipart).await?;
    let recipient = match form.text("recipient_username").map(str::trim).filter(|r| !r.is_empty()) {
        Some(name) => name.to_string(),
        None => query
            .recipient_username
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "recipient_username is required"))?,
    };
    let content = form.message_content(&state, &user.ctx, &user.id).await?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let (conversation, message) = message_engine::send_first(&user.ctx, &mut conn, &user.id, &recipient, content)?;

    Ok(Json(ApiResponse::ok(FirstMessageResponse { conversation, message })))
}
