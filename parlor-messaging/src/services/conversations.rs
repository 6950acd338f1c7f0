use chrono::NaiveDateTime;
use diesel::dsl::{count_star, exists};
use diesel::prelude::*;
use serde::Serialize;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::RequestContext;

use crate::models::{ContentKind, Conversation, NewConversation, NewMembership, User};
use crate::schema::{conversations, convmembers, message_comments, messages, users};
use crate::services::{guard, identity, now, photo_or_default};

// --- Read models ---

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MessagePreview {
    pub content: String,
    pub content_type: ContentKind,
}

/// One row of a user's conversation list, already resolved for that user.
#[derive(Debug, Serialize, Clone)]
pub struct ConversationSummary {
    pub id: i32,
    pub is_group: bool,
    pub name: Option<String>,
    pub photo: String,
    pub member_count: i64,
    pub last_message: Option<MessagePreview>,
    pub last_activity: NaiveDateTime,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub remaining_members: i64,
    pub conversation_deleted: bool,
}

// --- Lookups ---

pub fn get_by_id(ctx: &RequestContext, conn: &mut SqliteConnection, conversation_id: i32) -> AppResult<Conversation> {
    let _span = ctx.span("conversations.get").entered();
    load(conn, conversation_id)
}

pub(crate) fn load(conn: &mut SqliteConnection, conversation_id: i32) -> AppResult<Conversation> {
    conversations::table
        .find(conversation_id)
        .first::<Conversation>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))
}

pub fn find_between_users(
    conn: &mut SqliteConnection,
    user_a: &str,
    user_b: &str,
) -> AppResult<Option<Conversation>> {
    if user_a == user_b {
        return Ok(None);
    }

    let of_a = convmembers::table
        .filter(convmembers::user_id.eq(user_a))
        .select(convmembers::conversation_id);
    let of_b = convmembers::table
        .filter(convmembers::user_id.eq(user_b))
        .select(convmembers::conversation_id);

    let conversation = conversations::table
        .filter(conversations::is_group.eq(false))
        .filter(conversations::id.eq_any(of_a))
        .filter(conversations::id.eq_any(of_b))
        .order(conversations::id.asc())
        .first::<Conversation>(conn)
        .optional()?;
    Ok(conversation)
}

pub fn find_group_by_name(conn: &mut SqliteConnection, name: &str) -> AppResult<Option<Conversation>> {
    let group = conversations::table
        .filter(conversations::is_group.eq(true))
        .filter(conversations::name.eq(name))
        .first::<Conversation>(conn)
        .optional()?;
    Ok(group)
}

pub fn member_count(conn: &mut SqliteConnection, conversation_id: i32) -> AppResult<i64> {
    let count = convmembers::table
        .filter(convmembers::conversation_id.eq(conversation_id))
        .select(count_star())
        .first::<i64>(conn)?;
    Ok(count)
}

/// The other participant of a one-to-one conversation.
pub(crate) fn counterpart(
    conn: &mut SqliteConnection,
    conversation_id: i32,
    viewer: &str,
) -> AppResult<Option<User>> {
    let other = convmembers::table
        .inner_join(users::table)
        .filter(convmembers::conversation_id.eq(conversation_id))
        .filter(convmembers::user_id.ne(viewer))
        .select((users::id, users::name, users::photo))
        .first::<User>(conn)
        .optional()?;
    Ok(other)
}

/// Display name and photo of a conversation as `viewer` sees it.
pub(crate) fn effective_header(
    conn: &mut SqliteConnection,
    conversation: &Conversation,
    viewer: &str,
) -> AppResult<(Option<String>, String)> {
    if conversation.is_group {
        return Ok((conversation.name.clone(), photo_or_default(conversation.photo.clone())));
    }
    match counterpart(conn, conversation.id, viewer)? {
        Some(other) => Ok((Some(other.name), photo_or_default(other.photo))),
        None => Ok((conversation.name.clone(), photo_or_default(None))),
    }
}

fn add_member(conn: &mut SqliteConnection, conversation_id: i32, user_id: &str) -> AppResult<()> {
    diesel::insert_into(convmembers::table)
        .values(&NewMembership { conversation_id, user_id })
        .execute(conn)?;
    Ok(())
}

fn insert_conversation(
    conn: &mut SqliteConnection,
    is_group: bool,
    name: Option<&str>,
    photo: Option<&str>,
) -> AppResult<Conversation> {
    let conversation = diesel::insert_into(conversations::table)
        .values(&NewConversation {
            lastconvo: now(),
            is_group,
            photo,
            name,
        })
        .get_result::<Conversation>(conn)?;
    Ok(conversation)
}

fn require_group(conn: &mut SqliteConnection, conversation_id: i32) -> AppResult<()> {
    if guard::is_conversation_group(conn, conversation_id)? {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::NotAGroup, "operation is only allowed on group conversations"))
    }
}

fn group_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::new(ErrorCode::GroupNameRequired, "group name is required"));
    }
    Ok(name.to_string())
}

fn require_user(conn: &mut SqliteConnection, user_id: &str) -> AppResult<()> {
    let found = diesel::select(exists(users::table.find(user_id))).get_result::<bool>(conn)?;
    if found {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::UserNotFound, "user not found"))
    }
}

fn resolve_username(conn: &mut SqliteConnection, name: &str) -> AppResult<User> {
    identity::find_by_name(conn, name.trim())?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, format!("user '{}' not found", name.trim())))
}

// --- Mutations ---

pub fn create_one_to_one(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    user_a: &str,
    user_b: &str,
) -> AppResult<Conversation> {
    let _span = ctx.span("conversations.create_one_to_one").entered();

    if user_a == user_b {
        return Err(AppError::new(ErrorCode::SelfConversation, "cannot start a conversation with yourself"));
    }
    require_user(conn, user_a)?;
    require_user(conn, user_b)?;

    if let Some(existing) = find_between_users(conn, user_a, user_b)? {
        return Err(AppError::with_details(
            ErrorCode::ConversationAlreadyExists,
            "a conversation between these users already exists",
            serde_json::json!({ "conversation_id": existing.id }),
        ));
    }

    let conversation = insert_conversation(conn, false, None, None)?;
    add_member(conn, conversation.id, user_a)?;
    add_member(conn, conversation.id, user_b)?;

    tracing::info!(conversation_id = conversation.id, "one-to-one conversation created");
    Ok(conversation)
}

pub fn create_group(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    name: &str,
    creator: &str,
    member_names: &[String],
    photo: Option<&str>,
) -> AppResult<Conversation> {
    let _span = ctx.span("conversations.create_group").entered();
    let name = group_name(name)?;
    require_user(conn, creator)?;

    if find_group_by_name(conn, &name)?.is_some() {
        return Err(AppError::new(ErrorCode::GroupNameTaken, format!("group name '{name}' is already in use")));
    }

    let mut member_ids: Vec<String> = Vec::with_capacity(member_names.len());
    for member_name in member_names {
        let member = resolve_username(conn, member_name)?;
        if member.id != creator && !member_ids.contains(&member.id) {
            member_ids.push(member.id);
        }
    }

    let group = insert_conversation(conn, true, Some(&name), photo)?;
    add_member(conn, group.id, creator)?;
    for member_id in &member_ids {
        add_member(conn, group.id, member_id)?;
    }

    tracing::info!(conversation_id = group.id, name = %name, members = member_ids.len() + 1, "group created");
    Ok(group)
}

/// Returns the names that were actually added.
pub fn add_members(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    requester: &str,
    usernames: &[String],
) -> AppResult<Vec<String>> {
    let _span = ctx.span("conversations.add_members").entered();
    guard::require_member(conn, requester, conversation_id)?;
    require_group(conn, conversation_id)?;

    let mut resolved = Vec::with_capacity(usernames.len());
    for username in usernames {
        resolved.push(resolve_username(conn, username)?);
    }

    let mut added = Vec::new();
    for user in resolved {
        if guard::is_member(conn, &user.id, conversation_id)? {
            tracing::debug!(user_id = %user.id, "already a member, skipped");
            continue;
        }
        add_member(conn, conversation_id, &user.id)?;
        added.push(user.name);
    }

    tracing::info!(conversation_id, added = added.len(), "members added");
    Ok(added)
}

pub fn leave(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    user_id: &str,
) -> AppResult<LeaveOutcome> {
    let _span = ctx.span("conversations.leave").entered();
    guard::require_member(conn, user_id, conversation_id)?;
    require_group(conn, conversation_id)?;

    diesel::delete(
        convmembers::table
            .filter(convmembers::conversation_id.eq(conversation_id))
            .filter(convmembers::user_id.eq(user_id)),
    )
    .execute(conn)?;

    let remaining = member_count(conn, conversation_id)?;
    if remaining > 0 {
        tracing::info!(conversation_id, remaining, "member left group");
        return Ok(LeaveOutcome {
            remaining_members: remaining,
            conversation_deleted: false,
        });
    }

    purge(conn, conversation_id)?;
    tracing::info!(conversation_id, "last member left, group deleted");
    Ok(LeaveOutcome {
        remaining_members: 0,
        conversation_deleted: true,
    })
}

fn purge(conn: &mut SqliteConnection, conversation_id: i32) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        let message_ids = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .select(messages::id);
        diesel::delete(message_comments::table.filter(message_comments::message_id.eq_any(message_ids)))
            .execute(conn)?;
        diesel::delete(messages::table.filter(messages::conversation_id.eq(conversation_id))).execute(conn)?;
        diesel::delete(convmembers::table.filter(convmembers::conversation_id.eq(conversation_id)))
            .execute(conn)?;
        diesel::delete(conversations::table.find(conversation_id)).execute(conn)?;
        Ok(())
    })
}

pub fn rename(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    requester: &str,
    new_name: &str,
) -> AppResult<Conversation> {
    let _span = ctx.span("conversations.rename").entered();
    let name = group_name(new_name)?;
    guard::require_member(conn, requester, conversation_id)?;
    require_group(conn, conversation_id)?;

    if let Some(other) = find_group_by_name(conn, &name)? {
        if other.id != conversation_id {
            return Err(AppError::new(ErrorCode::GroupNameTaken, format!("group name '{name}' is already in use")));
        }
    }

    let group = diesel::update(conversations::table.find(conversation_id))
        .set(conversations::name.eq(&name))
        .get_result::<Conversation>(conn)?;

    tracing::info!(conversation_id, name = %name, "group renamed");
    Ok(group)
}

pub fn set_photo(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    requester: &str,
    photo: &str,
) -> AppResult<Conversation> {
    let _span = ctx.span("conversations.set_photo").entered();
    guard::require_member(conn, requester, conversation_id)?;
    require_group(conn, conversation_id)?;

    let group = diesel::update(conversations::table.find(conversation_id))
        .set(conversations::photo.eq(photo))
        .get_result::<Conversation>(conn)?;

    tracing::info!(conversation_id, photo = %photo, "group photo updated");
    Ok(group)
}

pub fn list_for_user(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Vec<ConversationSummary>> {
    let _span = ctx.span("conversations.list_for_user").entered();

    let joined = convmembers::table
        .filter(convmembers::user_id.eq(user_id))
        .select(convmembers::conversation_id);
    let convs = conversations::table
        .filter(conversations::id.eq_any(joined))
        .load::<Conversation>(conn)?;

    let mut summaries = Vec::with_capacity(convs.len());
    for conv in convs {
        let (name, photo) = effective_header(conn, &conv, user_id)?;

        let last = messages::table
            .filter(messages::conversation_id.eq(conv.id))
            .order((messages::datetime.desc(), messages::id.desc()))
            .select((messages::content, messages::content_type, messages::datetime))
            .first::<(String, ContentKind, NaiveDateTime)>(conn)
            .optional()?;

        let last_activity = match &last {
            Some((_, _, sent_at)) if *sent_at > conv.lastconvo => *sent_at,
            _ => conv.lastconvo,
        };

        summaries.push(ConversationSummary {
            id: conv.id,
            is_group: conv.is_group,
            name,
            photo,
            member_count: member_count(conn, conv.id)?,
            last_message: last.map(|(content, content_type, _)| MessagePreview { content, content_type }),
            last_activity,
        });
    }

    summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(b.id.cmp(&a.id)));

    tracing::debug!(count = summaries.len(), "conversations listed");
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageContent;
    use crate::services::testing::{setup, user};
    use crate::services::{messages as message_engine, DEFAULT_PHOTO};
    use parlor_shared::errors::ErrorKind;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_to_one_is_unique_per_pair() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");

        let conv = create_one_to_one(&ctx, &mut conn, &alice.id, &bob.id).unwrap();
        assert!(!conv.is_group);
        assert_eq!(member_count(&mut conn, conv.id).unwrap(), 2);

        for (a, b) in [(&alice.id, &bob.id), (&bob.id, &alice.id)] {
            let err = create_one_to_one(&ctx, &mut conn, a, b).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }

        assert_eq!(find_between_users(&mut conn, &bob.id, &alice.id).unwrap().unwrap().id, conv.id);
    }

    #[test]
    fn one_to_one_rejects_self_and_strangers() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");

        let err = create_one_to_one(&ctx, &mut conn, &alice.id, &alice.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = create_one_to_one(&ctx, &mut conn, &alice.id, "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn shared_group_does_not_count_as_one_to_one() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");

        create_group(&ctx, &mut conn, "team", &alice.id, &names(&["bob"]), None).unwrap();
        assert!(find_between_users(&mut conn, &alice.id, &bob.id).unwrap().is_none());
        assert!(create_one_to_one(&ctx, &mut conn, &alice.id, &bob.id).is_ok());
    }

    #[test]
    fn create_group_resolves_members_first() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        user(&ctx, &mut conn, "bob");

        let err = create_group(&ctx, &mut conn, "team", &alice.id, &names(&["bob", "nobody"]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(find_group_by_name(&mut conn, "team").unwrap().is_none());

        let group =
            create_group(&ctx, &mut conn, " team ", &alice.id, &names(&["bob", "bob", "alice"]), Some("/uploads/g.png"))
                .unwrap();
        assert!(group.is_group);
        assert_eq!(group.name.as_deref(), Some("team"));
        assert_eq!(group.photo.as_deref(), Some("/uploads/g.png"));
        assert_eq!(member_count(&mut conn, group.id).unwrap(), 2);

        let err = create_group(&ctx, &mut conn, "team", &alice.id, &names(&["bob"]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = create_group(&ctx, &mut conn, "  ", &alice.id, &names(&["bob"]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn add_members_rules() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");
        let carol = user(&ctx, &mut conn, "carol");
        user(&ctx, &mut conn, "dave");

        let group = create_group(&ctx, &mut conn, "team", &alice.id, &names(&["bob"]), None).unwrap();

        let added = add_members(&ctx, &mut conn, group.id, &bob.id, &names(&["alice", "carol", "dave"])).unwrap();
        assert_eq!(added, names(&["carol", "dave"]));
        assert_eq!(member_count(&mut conn, group.id).unwrap(), 4);

        let err = add_members(&ctx, &mut conn, group.id, &bob.id, &names(&["zed"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let direct = create_one_to_one(&ctx, &mut conn, &alice.id, &bob.id).unwrap();
        let err = add_members(&ctx, &mut conn, direct.id, &alice.id, &names(&["carol"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        let err = add_members(&ctx, &mut conn, direct.id, &carol.id, &names(&["dave"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn leaving_until_empty_deletes_group() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");
        let carol = user(&ctx, &mut conn, "carol");

        let group = create_group(&ctx, &mut conn, "team", &alice.id, &names(&["bob", "carol"]), None).unwrap();
        let msg = message_engine::send(&ctx, &mut conn, group.id, &bob.id, MessageContent::text("hello"), None).unwrap();
        crate::services::comments::add(&ctx, &mut conn, group.id, msg.id, &carol.id, MessageContent::text("hey"))
            .unwrap();

        let listed = list_for_user(&ctx, &mut conn, &alice.id).unwrap();
        assert_eq!(listed[0].member_count, 3);

        let out = leave(&ctx, &mut conn, group.id, &bob.id).unwrap();
        assert_eq!(out, LeaveOutcome { remaining_members: 2, conversation_deleted: false });

        let err = leave(&ctx, &mut conn, group.id, &bob.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        assert_eq!(leave(&ctx, &mut conn, group.id, &carol.id).unwrap().remaining_members, 1);
        let out = leave(&ctx, &mut conn, group.id, &alice.id).unwrap();
        assert!(out.conversation_deleted);

        assert_eq!(get_by_id(&ctx, &mut conn, group.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(list_for_user(&ctx, &mut conn, &alice.id).unwrap().is_empty());
        let orphans: i64 = messages::table.select(count_star()).first(&mut conn).unwrap();
        assert_eq!(orphans, 0);
        let orphans: i64 = message_comments::table.select(count_star()).first(&mut conn).unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn leave_is_group_only() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");
        let direct = create_one_to_one(&ctx, &mut conn, &alice.id, &bob.id).unwrap();

        let err = leave(&ctx, &mut conn, direct.id, &alice.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(member_count(&mut conn, direct.id).unwrap(), 2);
    }

    #[test]
    fn rename_and_photo_rules() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");
        let carol = user(&ctx, &mut conn, "carol");

        let team = create_group(&ctx, &mut conn, "team", &alice.id, &names(&["bob"]), None).unwrap();
        create_group(&ctx, &mut conn, "other", &alice.id, &names(&["bob"]), None).unwrap();

        assert_eq!(rename(&ctx, &mut conn, team.id, &bob.id, "team").unwrap().name.as_deref(), Some("team"));
        assert_eq!(rename(&ctx, &mut conn, team.id, &bob.id, "crew").unwrap().name.as_deref(), Some("crew"));
        assert_eq!(rename(&ctx, &mut conn, team.id, &bob.id, "other").unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(rename(&ctx, &mut conn, team.id, &carol.id, "mine").unwrap_err().kind(), ErrorKind::Forbidden);

        let updated = set_photo(&ctx, &mut conn, team.id, &alice.id, "/uploads/team.png").unwrap();
        assert_eq!(updated.photo.as_deref(), Some("/uploads/team.png"));
        assert_eq!(
            set_photo(&ctx, &mut conn, team.id, &carol.id, "/uploads/x.png").unwrap_err().kind(),
            ErrorKind::Forbidden
        );

        let direct = create_one_to_one(&ctx, &mut conn, &alice.id, &bob.id).unwrap();
        assert_eq!(
            rename(&ctx, &mut conn, direct.id, &alice.id, "pair").unwrap_err().kind(),
            ErrorKind::InvalidOperation
        );
        assert_eq!(
            set_photo(&ctx, &mut conn, direct.id, &alice.id, "/uploads/x.png").unwrap_err().kind(),
            ErrorKind::InvalidOperation
        );
    }

    #[test]
    fn listing_resolves_names_and_orders_by_activity() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");
        identity::set_photo(&ctx, &mut conn, &bob.id, "/uploads/bob.png").unwrap();

        let direct = create_one_to_one(&ctx, &mut conn, &alice.id, &bob.id).unwrap();
        let group = create_group(&ctx, &mut conn, "team", &alice.id, &names(&["bob"]), None).unwrap();

        // newest conversation first while both are silent
        let listed = list_for_user(&ctx, &mut conn, &alice.id).unwrap();
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![group.id, direct.id]);
        assert!(listed[0].last_message.is_none());
        assert_eq!(listed[0].photo, DEFAULT_PHOTO);

        message_engine::send(&ctx, &mut conn, direct.id, &alice.id, MessageContent::text("ping"), None).unwrap();

        let listed = list_for_user(&ctx, &mut conn, &alice.id).unwrap();
        assert_eq!(listed[0].id, direct.id);
        assert_eq!(listed[0].name.as_deref(), Some("bob"));
        assert_eq!(listed[0].photo, "/uploads/bob.png");
        assert_eq!(listed[0].member_count, 2);
        assert_eq!(
            listed[0].last_message,
            Some(MessagePreview { content: "ping".into(), content_type: ContentKind::Text })
        );

        let for_bob = list_for_user(&ctx, &mut conn, &bob.id).unwrap();
        let direct_for_bob = for_bob.iter().find(|s| s.id == direct.id).unwrap();
        assert_eq!(direct_for_bob.name.as_deref(), Some("alice"));
        assert_eq!(direct_for_bob.photo, DEFAULT_PHOTO);
    }
}
