pub mod comments;
pub mod conversations;
pub mod form;
pub mod groups;
pub mod health;
pub mod messages;
pub mod session;
pub mod users;

use parlor_shared::clients::db::DbPool;
use parlor_shared::errors::{AppError, AppResult};

use crate::services::guard;

/// Membership check on a connection that is released before the caller reads a request body.
pub(crate) fn check_member(pool: &DbPool, user_id: &str, conversation_id: i32) -> AppResult<()> {
    let mut conn = pool.get().map_err(|e| AppError::Internal(e.into()))?;
    guard::require_member(&mut conn, user_id, conversation_id)
}
