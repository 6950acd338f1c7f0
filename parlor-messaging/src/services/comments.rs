use diesel::prelude::*;
use serde::Serialize;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::RequestContext;

use crate::models::{Comment, Message, MessageContent, MessageStatus, NewComment};
use crate::schema::{message_comments, messages, users};
use crate::services::messages::{insert_message, validate_content};
use crate::services::{guard, now};

/// A comment either annotates a live message or, when the message is gone,
/// lands in the conversation as a message of its own.
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum CommentOutcome {
    Attached(Comment),
    Promoted(Message),
}

#[derive(Debug, Serialize, Clone)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: String,
}

pub fn add(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    conversation_id: i32,
    message_id: i32,
    author: &str,
    content: MessageContent,
) -> AppResult<CommentOutcome> {
    let _span = ctx.span("comments.add").entered();
    validate_content(&content)?;
    guard::require_member(conn, author, conversation_id)?;

    let parent = messages::table
        .find(message_id)
        .select(messages::conversation_id)
        .first::<i32>(conn)
        .optional()?;

    match parent {
        None => {
            let message = insert_message(conn, conversation_id, author, &content, MessageStatus::CommentConverted, None)?;
            tracing::info!(conversation_id, message_id, promoted_id = message.id, "comment target gone, posted as message");
            Ok(CommentOutcome::Promoted(message))
        }
        Some(owner) if owner != conversation_id => Err(AppError::new(
            ErrorCode::MessageNotFound,
            "message not found in this conversation",
        )),
        Some(_) => {
            let comment = diesel::insert_into(message_comments::table)
                .values(&NewComment {
                    message_id,
                    user_id: author,
                    content_type: content.kind,
                    content: &content.body,
                    timestamp: now(),
                })
                .get_result::<Comment>(conn)?;
            tracing::info!(message_id, comment_id = comment.id, kind = %comment.content_type, "comment added");
            Ok(CommentOutcome::Attached(comment))
        }
    }
}

/// Only the author may remove a comment; a missing comment is refused the same way.
pub fn remove(ctx: &RequestContext, conn: &mut SqliteConnection, comment_id: i32, requester: &str) -> AppResult<()> {
    let _span = ctx.span("comments.remove").entered();

    if !guard::is_comment_owner(conn, requester, comment_id)? {
        return Err(AppError::new(ErrorCode::NotCommentOwner, "only the author can remove this comment"));
    }
    diesel::delete(message_comments::table.find(comment_id)).execute(conn)?;

    tracing::info!(comment_id, "comment removed");
    Ok(())
}

pub fn list_for(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    message_id: i32,
    requester: &str,
) -> AppResult<Vec<CommentView>> {
    let _span = ctx.span("comments.list").entered();

    let conversation_id = messages::table
        .find(message_id)
        .select(messages::conversation_id)
        .first::<i32>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))?;
    guard::require_member(conn, requester, conversation_id)?;

    let rows = message_comments::table
        .inner_join(users::table)
        .filter(message_comments::message_id.eq(message_id))
        .order((message_comments::timestamp.asc(), message_comments::id.asc()))
        .select((message_comments::all_columns, users::name))
        .load::<(Comment, String)>(conn)?;

    Ok(rows
        .into_iter()
        .map(|(comment, author_name)| CommentView { comment, author_name })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;
    use crate::services::messages as message_engine;
    use crate::services::testing::{setup, user};
    use parlor_shared::errors::ErrorKind;

    fn attached(outcome: CommentOutcome) -> Comment {
        match outcome {
            CommentOutcome::Attached(comment) => comment,
            other => panic!("expected attached comment, got {other:?}"),
        }
    }

    #[test]
    fn comments_are_listed_in_order_with_authors() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");
        let (conv, msg) =
            message_engine::send_first(&ctx, &mut conn, &alice.id, "bob", MessageContent::text("photo time")).unwrap();

        let first = attached(add(&ctx, &mut conn, conv.id, msg.id, &bob.id, MessageContent::text("wow")).unwrap());
        add(&ctx, &mut conn, conv.id, msg.id, &alice.id, MessageContent::new(ContentKind::Emoji, "<3")).unwrap();

        assert_eq!(first.message_id, msg.id);
        assert_eq!(first.content_type, ContentKind::Text);

        let listed = list_for(&ctx, &mut conn, msg.id, &alice.id).unwrap();
        let summary: Vec<(&str, &str)> = listed.iter().map(|c| (c.author_name.as_str(), c.comment.content.as_str())).collect();
        assert_eq!(summary, vec![("bob", "wow"), ("alice", "<3")]);
    }

    #[test]
    fn membership_and_existence() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let carol = user(&ctx, &mut conn, "carol");
        user(&ctx, &mut conn, "bob");
        let (conv, msg) = message_engine::send_first(&ctx, &mut conn, &alice.id, "bob", MessageContent::text("hi")).unwrap();
        let (other, foreign) =
            message_engine::send_first(&ctx, &mut conn, &alice.id, "carol", MessageContent::text("yo")).unwrap();

        let err = add(&ctx, &mut conn, conv.id, msg.id, &carol.id, MessageContent::text("hey")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = add(&ctx, &mut conn, conv.id, foreign.id, &alice.id, MessageContent::text("hey")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = list_for(&ctx, &mut conn, msg.id, &carol.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = list_for(&ctx, &mut conn, 5555, &alice.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(list_for(&ctx, &mut conn, foreign.id, &carol.id).unwrap().is_empty());
        assert_eq!(other.id, foreign.conversation_id);
    }

    #[test]
    fn comment_on_missing_message_becomes_a_message() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        user(&ctx, &mut conn, "bob");
        let (conv, _) = message_engine::send_first(&ctx, &mut conn, &alice.id, "bob", MessageContent::text("hi")).unwrap();

        let outcome = add(&ctx, &mut conn, conv.id, 31337, &alice.id, MessageContent::new(ContentKind::Emoji, ":o")).unwrap();
        match outcome {
            CommentOutcome::Promoted(message) => {
                assert_eq!(message.conversation_id, conv.id);
                assert_eq!(message.status, MessageStatus::CommentConverted);
                assert_eq!(message.content_type, ContentKind::Emoji);
                assert_eq!(message.sender, alice.id);
            }
            other => panic!("expected promotion, got {other:?}"),
        }
    }

    #[test]
    fn only_author_removes() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        let bob = user(&ctx, &mut conn, "bob");
        let (conv, msg) = message_engine::send_first(&ctx, &mut conn, &alice.id, "bob", MessageContent::text("hi")).unwrap();
        let comment = attached(add(&ctx, &mut conn, conv.id, msg.id, &bob.id, MessageContent::text("hey")).unwrap());

        let err = remove(&ctx, &mut conn, comment.id, &alice.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        remove(&ctx, &mut conn, comment.id, &bob.id).unwrap();
        assert!(list_for(&ctx, &mut conn, msg.id, &bob.id).unwrap().is_empty());

        let err = remove(&ctx, &mut conn, comment.id, &bob.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn outcome_wire_shape() {
        let (ctx, mut conn) = setup();
        let alice = user(&ctx, &mut conn, "alice");
        user(&ctx, &mut conn, "bob");
        let (conv, msg) = message_engine::send_first(&ctx, &mut conn, &alice.id, "bob", MessageContent::text("hi")).unwrap();

        let outcome = add(&ctx, &mut conn, conv.id, msg.id, &alice.id, MessageContent::text("note")).unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "attached");
        assert_eq!(json["data"]["content"], "note");
        assert_eq!(json["data"]["content_type"], "text");
    }
}
