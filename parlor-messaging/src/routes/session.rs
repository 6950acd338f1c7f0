use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::{ApiResponse, RequestContext};

use crate::models::User;
use crate::services::identity;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64, message = "username is required"))]
    #[serde(alias = "name")]
    pub username: String,
}

/// POST /session - log in by name; unknown names get a fresh identity whose id is the bearer token
pub async fn login(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let user = identity::login_or_create(&ctx, &mut conn, &req.username)?;

    Ok(Json(ApiResponse::ok(user)))
}
