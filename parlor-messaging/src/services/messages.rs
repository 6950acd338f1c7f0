use std::collections::HashMap;

use diesel::prelude::*;
use serde::Serialize;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::RequestContext;

use crate::models::{Comment, Conversation, Message, MessageContent, MessageStatus, NewMessage, User};
use crate::schema::{message_comments, messages, users};
use crate::services::conversations as conversation_store;
use crate::services::{guard, identity, now, photo_or_default};

/// Who may delete a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    #[default]
    AnyMember,
    SenderOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardTarget {
    Conversation(i32),
    /// A group name, or else a username whose one-to-one conversation is reused or created.
    ByName(String),
}

// --- Read models ---

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReplySnapshot {
    pub id: i32,
    pub content: Option<String>,
    pub sender_name: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender_name: String,
    pub sender_photo: String,
    pub reply: Option<ReplySnapshot>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ConversationHeader {
    pub id: i32,
    pub is_group: bool,
    pub name: Option<String>,
    pub photo: String,
    pub member_count: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct ConversationDetail {
    pub conversation: ConversationHeader,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize, Clone)]
pub struct DeleteOutcome {
    pub deleted_message_id: i32,
    pub promoted: Vec<Message>,
}

pub(crate) fn validate_content(content: &MessageContent) -> AppResult<()> {
    if content.body.trim().is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "content is required"));
    }
    Ok(())
}

/// Lenient reading of a client-supplied reply reference.
pub fn parse_reply_to(raw: Option<&str>) -> Option<i32> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;
    match raw.parse::<i32>() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(reply_to = %raw, "ignoring unparsable reply reference");
            None
        }
    }
}

fn find_in_conversation(
    conn: &mut SqliteConnection,
    conversation_id: i32,
    message_id: i32,
) -> AppResult<Option<Message>> {
    let message = messages::table
        .filter(messages::id.eq(message_id))
        .filter(messages::conversation_id.eq(conversation_id))
        .first::<Message>(conn)
        .optional()?;
    Ok(message)
}

pub(crate) fn insert_message(
    conn: &mut SqliteConnection,
    conversation_id: i32,
    sender: &str,
    content: &MessageContent,
    status: MessageStatus,
    reply_to: Option<i32>,
) -> AppResult<Message> {
    let message = diesel::insert_into(messages::table)
        .values(&NewMessage {
            datetime: now(),
            content: &content.body,
            content_type: content.kind,
            sender,
            conversation_id,
            status,
            reply_to,
        })
        .get_result::<Message>(conn)?;
    Ok(message)
}

pub fn send(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    sender: &str,
    content: MessageContent,
    reply_to: Option<i32>,
) -> AppResult<Message> {
    let _span = ctx.span("messages.send").entered();
    validate_content(&content)?;
    guard::require_member(conn, sender, conversation_id)?;

    let reply_to = match reply_to {
        Some(id) if find_in_conversation(conn, conversation_id, id)?.is_some() => Some(id),
        Some(id) => {
            tracing::warn!(reply_to = id, conversation_id, "reply target not in conversation, dropped");
            None
        }
        None => None,
    };

    let message = insert_message(conn, conversation_id, sender, &content, MessageStatus::Sent, reply_to)?;
    tracing::info!(
        conversation_id,
        message_id = message.id,
        kind = %message.content_type,
        reply_to = ?message.reply_to,
        "message sent"
    );
    Ok(message)
}

/// Open a one-to-one conversation with `recipient_name` and post its first message.
pub fn send_first(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    sender: &str,
    recipient_name: &str,
    content: MessageContent,
) -> AppResult<(Conversation, Message)> {
    let _span = ctx.span("messages.send_first").entered();
    validate_content(&content)?;

    let recipient = identity::find_by_name(conn, recipient_name.trim())?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, format!("user '{}' not found", recipient_name.trim())))?;

    let conversation = conversation_store::create_one_to_one(ctx, conn, sender, &recipient.id)?;
    let message = insert_message(conn, conversation.id, sender, &content, MessageStatus::Sent, None)?;

    tracing::info!(conversation_id = conversation.id, message_id = message.id, "first message sent");
    Ok((conversation, message))
}

pub fn get(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    requester: &str,
) -> AppResult<ConversationDetail> {
    let _span = ctx.span("messages.get").entered();
    guard::require_member(conn, requester, conversation_id)?;

    let conversation = conversation_store::load(conn, conversation_id)?;
    let (name, photo) = conversation_store::effective_header(conn, &conversation, requester)?;
    let header = ConversationHeader {
        id: conversation.id,
        is_group: conversation.is_group,
        name,
        photo,
        member_count: conversation_store::member_count(conn, conversation.id)?,
    };

    let rows = messages::table
        .inner_join(users::table)
        .filter(messages::conversation_id.eq(conversation_id))
        .order((messages::datetime.asc(), messages::id.asc()))
        .select((messages::all_columns, (users::id, users::name, users::photo)))
        .load::<(Message, User)>(conn)?;

    let reply_ids: Vec<i32> = rows.iter().filter_map(|(m, _)| m.reply_to).collect();
    let referenced: HashMap<i32, (String, String)> = if reply_ids.is_empty() {
        HashMap::new()
    } else {
        messages::table
            .inner_join(users::table)
            .filter(messages::id.eq_any(&reply_ids))
            .select((messages::id, messages::content, users::name))
            .load::<(i32, String, String)>(conn)?
            .into_iter()
            .map(|(id, content, sender_name)| (id, (content, sender_name)))
            .collect()
    };

    let messages = rows
        .into_iter()
        .map(|(message, sender)| {
            let reply = message.reply_to.map(|id| match referenced.get(&id) {
                Some((content, sender_name)) => ReplySnapshot {
                    id,
                    content: Some(content.clone()),
                    sender_name: Some(sender_name.clone()),
                },
                None => ReplySnapshot { id, content: None, sender_name: None },
            });
            MessageView {
                message,
                sender_name: sender.name,
                sender_photo: photo_or_default(sender.photo),
                reply,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(conversation_id, count = messages.len(), "conversation loaded");
    Ok(ConversationDetail { conversation: header, messages })
}

/// Delete a message, turning its comments into standalone messages first.
pub fn delete(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    message_id: i32,
    requester: &str,
    policy: DeletePolicy,
) -> AppResult<DeleteOutcome> {
    let _span = ctx.span("messages.delete").entered();
    guard::require_member(conn, requester, conversation_id)?;

    if find_in_conversation(conn, conversation_id, message_id)?.is_none() {
        return Err(AppError::new(ErrorCode::MessageNotFound, "message not found in this conversation"));
    }
    if policy == DeletePolicy::SenderOnly && !guard::is_message_owner(conn, requester, message_id)? {
        return Err(AppError::new(ErrorCode::NotMessageOwner, "only the sender can delete this message"));
    }

    let promoted = conn.transaction::<_, AppError, _>(|conn| {
        let comments = message_comments::table
            .filter(message_comments::message_id.eq(message_id))
            .order((message_comments::timestamp.asc(), message_comments::id.asc()))
            .load::<Comment>(conn)?;

        let converted_at = now();
        let mut promoted = Vec::with_capacity(comments.len());
        for comment in &comments {
            let message = diesel::insert_into(messages::table)
                .values(&NewMessage {
                    datetime: converted_at,
                    content: &comment.content,
                    content_type: comment.content_type,
                    sender: &comment.user_id,
                    conversation_id,
                    status: MessageStatus::CommentConverted,
                    reply_to: None,
                })
                .get_result::<Message>(conn)?;
            promoted.push(message);
        }

        diesel::delete(message_comments::table.filter(message_comments::message_id.eq(message_id)))
            .execute(conn)?;
        diesel::update(messages::table.filter(messages::reply_to.eq(message_id)))
            .set(messages::reply_to.eq(None::<i32>))
            .execute(conn)?;
        diesel::delete(messages::table.find(message_id)).execute(conn)?;

        Ok(promoted)
    })?;

    tracing::info!(conversation_id, message_id, promoted = promoted.len(), "message deleted");
    Ok(DeleteOutcome {
        deleted_message_id: message_id,
        promoted,
    })
}

fn resolve_forward_target(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    requester: &str,
    target: &ForwardTarget,
) -> AppResult<i32> {
    match target {
        ForwardTarget::Conversation(id) => {
            guard::require_member(conn, requester, *id)?;
            Ok(*id)
        }
        ForwardTarget::ByName(name) => {
            let name = name.trim();
            if let Some(group) = conversation_store::find_group_by_name(conn, name)? {
                guard::require_member(conn, requester, group.id)?;
                return Ok(group.id);
            }

            let user = identity::find_by_name(conn, name)?
                .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, format!("no group or user named '{name}'")))?;
            if user.id == requester {
                return Err(AppError::new(ErrorCode::SelfConversation, "cannot forward a message to yourself"));
            }
            match conversation_store::find_between_users(conn, requester, &user.id)? {
                Some(existing) => Ok(existing.id),
                None => Ok(conversation_store::create_one_to_one(ctx, conn, requester, &user.id)?.id),
            }
        }
    }
}

pub fn forward(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    source_conversation_id: i32,
    message_id: i32,
    requester: &str,
    target: ForwardTarget,
) -> AppResult<Message> {
    let _span = ctx.span("messages.forward").entered();
    guard::require_member(conn, requester, source_conversation_id)?;

    let original = find_in_conversation(conn, source_conversation_id, message_id)?
        .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found in this conversation"))?;

    let target_id = resolve_forward_target(ctx, conn, requester, &target)?;
    let content = MessageContent::new(original.content_type, original.content);
    let message = insert_message(conn, target_id, requester, &content, MessageStatus::Forwarded, None)?;

    tracing::info!(
        from = source_conversation_id,
        to = target_id,
        original_id = message_id,
        message_id = message.id,
        "message forwarded"
    );
    Ok(message)
}
