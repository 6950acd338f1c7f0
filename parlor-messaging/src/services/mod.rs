pub mod comments;
pub mod conversations;
pub mod guard;
pub mod identity;
pub mod messages;

use chrono::{NaiveDateTime, Utc};

/// Photo shown for users and conversations that never set one.
pub const DEFAULT_PHOTO: &str = "/default-profile.png";

pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub(crate) fn photo_or_default(photo: Option<String>) -> String {
    photo
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PHOTO.to_string())
}
