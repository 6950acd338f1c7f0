//! Membership and ownership predicates checked before every mutation.
//!
//! A missing row answers `false`; only persistence failures are errors.

use diesel::dsl::exists;
use diesel::prelude::*;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};

use crate::schema::{conversations, convmembers, message_comments, messages};

pub fn is_member(conn: &mut SqliteConnection, user_id: &str, conversation_id: i32) -> AppResult<bool> {
    let found = diesel::select(exists(
        convmembers::table
            .filter(convmembers::conversation_id.eq(conversation_id))
            .filter(convmembers::user_id.eq(user_id)),
    ))
    .get_result::<bool>(conn)?;
    Ok(found)
}

pub fn is_comment_owner(conn: &mut SqliteConnection, user_id: &str, comment_id: i32) -> AppResult<bool> {
    let found = diesel::select(exists(
        message_comments::table
            .filter(message_comments::id.eq(comment_id))
            .filter(message_comments::user_id.eq(user_id)),
    ))
    .get_result::<bool>(conn)?;
    Ok(found)
}

pub fn is_message_owner(conn: &mut SqliteConnection, user_id: &str, message_id: i32) -> AppResult<bool> {
    let found = diesel::select(exists(
        messages::table
            .filter(messages::id.eq(message_id))
            .filter(messages::sender.eq(user_id)),
    ))
    .get_result::<bool>(conn)?;
    Ok(found)
}

pub fn is_conversation_group(conn: &mut SqliteConnection, conversation_id: i32) -> AppResult<bool> {
    let is_group = conversations::table
        .find(conversation_id)
        .select(conversations::is_group)
        .first::<bool>(conn)
        .optional()?;
    Ok(is_group.unwrap_or(false))
}

/// Absent conversations and foreign ones are reported the same way.
pub fn require_member(conn: &mut SqliteConnection, user_id: &str, conversation_id: i32) -> AppResult<()> {
    if is_member(conn, user_id, conversation_id)? {
        Ok(())
    } else {
        Err(AppError::new(
            ErrorCode::NotConversationMember,
            "user is not part of this conversation",
        ))
    }
}
