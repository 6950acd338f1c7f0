use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use parlor_shared::errors::{AppError, ErrorCode};
use parlor_shared::types::{BearerToken, RequestContext};

use crate::services::identity;
use crate::AppState;

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub ctx: RequestContext,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let ctx = match RequestContext::from_request_parts(parts, state).await {
            Ok(ctx) => ctx,
            Err(never) => match never {},
        };
        let token = BearerToken::from_request_parts(parts, state).await?;

        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        let user = identity::resolve(&ctx, &mut conn, token.as_str()).map_err(|e| match e.code() {
            Some(ErrorCode::UserNotFound) => AppError::new(ErrorCode::TokenInvalid, "invalid token"),
            _ => e,
        })?;

        let ctx = ctx.for_user(user.id.clone());
        parts.extensions.insert(ctx.clone());

        Ok(AuthUser {
            id: user.id,
            ctx,
        })
    }
}
