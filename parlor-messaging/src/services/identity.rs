use diesel::dsl::exists;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::RequestContext;

use crate::models::{NewUser, User};
use crate::schema::{conversations, convmembers, users};
use crate::services::conversations as conversation_store;

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 25;

#[derive(Debug, Serialize)]
pub struct UserSearchResult {
    #[serde(flatten)]
    pub user: User,
    pub conversation_id: Option<i32>,
}

/// Trimmed display name, or `InvalidUsername` when out of bounds.
pub fn validate_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(AppError::new(
            ErrorCode::InvalidUsername,
            format!("username must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

/// Map a bearer token to the user it was issued for.
pub fn resolve(ctx: &RequestContext, conn: &mut SqliteConnection, token: &str) -> AppResult<User> {
    if token.is_empty() {
        return Err(AppError::new(ErrorCode::TokenMissing, "missing bearer token"));
    }
    let id = Uuid::parse_str(token)
        .map_err(|_| AppError::new(ErrorCode::TokenMalformed, "bearer token is not a valid identifier"))?;

    let user = users::table
        .find(id.to_string())
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    tracing::debug!(req_id = %ctx.request_id, user_id = %user.id, "token resolved");
    Ok(user)
}

/// Log in by name, issuing a new identity the first time a name is seen.
pub fn login_or_create(ctx: &RequestContext, conn: &mut SqliteConnection, display_name: &str) -> AppResult<User> {
    let _span = ctx.span("identity.login").entered();
    let name = validate_name(display_name)?;

    if let Some(user) = find_by_name(conn, &name)? {
        tracing::info!(user_id = %user.id, "existing user logged in");
        return Ok(user);
    }

    let id = Uuid::new_v4().to_string();
    let user = diesel::insert_into(users::table)
        .values(&NewUser { id: &id, name: &name })
        .get_result::<User>(conn)?;

    tracing::info!(user_id = %user.id, name = %user.name, "user created");
    Ok(user)
}

/// Change a display name and rewrite the stored name of the user's one-to-one conversations.
pub fn rename(ctx: &RequestContext, conn: &mut SqliteConnection, user_id: &str, new_name: &str) -> AppResult<User> {
    let _span = ctx.span("identity.rename").entered();
    let name = validate_name(new_name)?;

    let user = conn.transaction::<_, AppError, _>(|conn| {
        let taken = diesel::select(exists(
            users::table
                .filter(users::name.eq(&name))
                .filter(users::id.ne(user_id)),
        ))
        .get_result::<bool>(conn)?;
        if taken {
            return Err(AppError::new(
                ErrorCode::UsernameTaken,
                format!("username '{name}' is already taken by another user"),
            ));
        }

        let user = diesel::update(users::table.find(user_id))
            .set(users::name.eq(&name))
            .get_result::<User>(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

        let memberships = convmembers::table
            .filter(convmembers::user_id.eq(user_id))
            .select(convmembers::conversation_id);
        let rewritten = diesel::update(
            conversations::table
                .filter(conversations::is_group.eq(false))
                .filter(conversations::id.eq_any(memberships)),
        )
        .set(conversations::name.eq(&name))
        .execute(conn)?;

        tracing::debug!(conversations = rewritten, "one-to-one names rewritten");
        Ok(user)
    })?;

    tracing::info!(user_id = %user.id, name = %user.name, "user renamed");
    Ok(user)
}

pub fn set_photo(ctx: &RequestContext, conn: &mut SqliteConnection, user_id: &str, photo: &str) -> AppResult<User> {
    let _span = ctx.span("identity.set_photo").entered();

    let user = diesel::update(users::table.find(user_id))
        .set(users::photo.eq(photo))
        .get_result::<User>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    tracing::info!(user_id = %user.id, photo = %photo, "user photo updated");
    Ok(user)
}

pub fn get(ctx: &RequestContext, conn: &mut SqliteConnection, user_id: &str) -> AppResult<User> {
    let _span = ctx.span("identity.get").entered();
    users::table
        .find(user_id)
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))
}

pub fn find_by_name(conn: &mut SqliteConnection, name: &str) -> AppResult<Option<User>> {
    let user = users::table
        .filter(users::name.eq(name))
        .first::<User>(conn)
        .optional()?;
    Ok(user)
}

/// Exact-name lookup plus the requester's existing one-to-one conversation with that user.
pub fn search(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    requester: &str,
    username: &str,
) -> AppResult<UserSearchResult> {
    let _span = ctx.span("identity.search").entered();

    let user = find_by_name(conn, username.trim())?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;
    let conversation_id = conversation_store::find_between_users(conn, requester, &user.id)?.map(|c| c.id);

    Ok(UserSearchResult { user, conversation_id })
}
