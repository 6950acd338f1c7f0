use chrono::NaiveDateTime;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

use crate::schema::{conversations, convmembers, message_comments, messages, users};

// --- Closed vocabularies ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Emoji,
    Photo,
    Gif,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Emoji => "emoji",
            Self::Photo => "photo",
            Self::Gif => "gif",
        }
    }

    /// Media kinds carry a stored-file reference instead of literal text.
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Photo | Self::Gif)
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "emoji" => Ok(Self::Emoji),
            "photo" => Ok(Self::Photo),
            "gif" => Ok(Self::Gif),
            _ => Err(format!("unknown content type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "kebab-case")]
pub enum MessageStatus {
    Sent,
    Forwarded,
    CommentConverted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Forwarded => "forwarded",
            Self::CommentConverted => "comment-converted",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "forwarded" => Ok(Self::Forwarded),
            "comment-converted" => Ok(Self::CommentConverted),
            _ => Err(format!("unknown message status: {s}")),
        }
    }
}

macro_rules! text_column_enum {
    ($ty:ty) => {
        impl ToSql<Text, Sqlite> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $ty {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                raw.parse::<$ty>().map_err(Into::into)
            }
        }
    };
}

text_column_enum!(ContentKind);
text_column_enum!(MessageStatus);

/// Validated message or comment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub kind: ContentKind,
    pub body: String,
}

impl MessageContent {
    pub fn new(kind: ContentKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(ContentKind::Text, body)
    }
}

// --- User ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    #[serde(rename = "username")]
    pub name: String,
    pub photo: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

// --- Conversation ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: i32,
    #[serde(rename = "created_at")]
    pub lastconvo: NaiveDateTime,
    pub is_group: bool,
    pub photo: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation<'a> {
    pub lastconvo: NaiveDateTime,
    pub is_group: bool,
    pub photo: Option<&'a str>,
    pub name: Option<&'a str>,
}

// --- Membership ---

#[derive(Debug, Insertable)]
#[diesel(table_name = convmembers)]
pub struct NewMembership<'a> {
    pub conversation_id: i32,
    pub user_id: &'a str,
}

// --- Message ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: i32,
    pub datetime: NaiveDateTime,
    pub content: String,
    pub content_type: ContentKind,
    pub sender: String,
    pub conversation_id: i32,
    pub status: MessageStatus,
    pub reply_to: Option<i32>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub datetime: NaiveDateTime,
    pub content: &'a str,
    pub content_type: ContentKind,
    pub sender: &'a str,
    pub conversation_id: i32,
    pub status: MessageStatus,
    pub reply_to: Option<i32>,
}

// --- Comment ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = message_comments)]
pub struct Comment {
    pub id: i32,
    pub message_id: i32,
    pub user_id: String,
    pub content_type: ContentKind,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = message_comments)]
pub struct NewComment<'a> {
    pub message_id: i32,
    pub user_id: &'a str,
    pub content_type: ContentKind,
    pub content: &'a str,
    pub timestamp: NaiveDateTime,
}
