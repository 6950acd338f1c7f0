use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::ApiResponse;

use crate::extract::AuthUser;
use crate::models::Conversation;
use crate::routes::form::FormData;
use crate::services::conversations::{self as conversation_store, LeaveOutcome};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct AddMembersRequest {
    #[validate(length(min = 1, message = "at least one username is required"))]
    pub usernames: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RenameGroupRequest {
    #[validate(length(min = 1, message = "new name is required"))]
    pub new_name: String,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct AddMembersResponse {
    pub added: Vec<String>,
}

/// `usernames` arrives as a JSON array string; a comma-separated list is accepted too.
fn parse_usernames(raw: &str) -> AppResult<Vec<String>> {
    let raw = raw.trim();
    let names: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw)
            .map_err(|e| AppError::new(ErrorCode::ValidationError, format!("invalid usernames format: {e}")))?
    } else {
        raw.split(',').map(|s| s.trim().to_string()).collect()
    };

    Ok(names.into_iter().filter(|n| !n.trim().is_empty()).collect())
}

/// POST /groups - multipart: group_name, usernames, optional photo
pub async fn create_group(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let mut form = FormData::read(multipart).await?;
    let name = form.required("group_name")?.to_string();
    let usernames = parse_usernames(form.required("usernames")?)?;
    if usernames.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "usernames are required"));
    }

    let photo = form.store_image("photo", &state, &user.ctx, &user.id).await?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let group = conversation_store::create_group(&user.ctx, &mut conn, &name, &user.id, &usernames, photo.as_deref())?;

    Ok(Json(ApiResponse::ok_with_message(group, "group created")))
}

/// POST /groups/:id/members
pub async fn add_to_group(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i32>,
    Json(req): Json<AddMembersRequest>,
) -> AppResult<Json<ApiResponse<AddMembersResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let added = conversation_store::add_members(&user.ctx, &mut conn, conversation_id, &user.id, &req.usernames)?;

    Ok(Json(ApiResponse::ok(AddMembersResponse { added })))
}

/// DELETE /groups/:id/leave - the last member out deletes the group
pub async fn leave_group(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i32>,
) -> AppResult<Json<ApiResponse<LeaveOutcome>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let outcome = conversation_store::leave(&user.ctx, &mut conn, conversation_id, &user.id)?;

    Ok(Json(ApiResponse::ok(outcome)))
}

/// PUT /groups/:id/name
pub async fn set_group_name(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i32>,
    Json(req): Json<RenameGroupRequest>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let group = conversation_store::rename(&user.ctx, &mut conn, conversation_id, &user.id, &req.new_name)?;

    Ok(Json(ApiResponse::ok_with_message(group, "group renamed")))
}
