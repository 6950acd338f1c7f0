use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Coarse failure classes every operation reports.
///
/// Routers translate these into transport status codes; callers branch on
/// them instead of on the fine-grained [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    NotFound,
    Forbidden,
    Conflict,
    InvalidInput,
    InvalidOperation,
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::InvalidOperation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Identity errors
/// - E4xxx: Messaging errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Forbidden,
    BadRequest,
    PayloadTooLarge,
    UnsupportedMediaType,
    StorageError,

    // Identity (E1xxx)
    TokenMissing,
    TokenMalformed,
    TokenInvalid,
    UserNotFound,
    UsernameTaken,
    InvalidUsername,

    // Messaging (E4xxx)
    ConversationNotFound,
    NotConversationMember,
    MessageNotFound,
    GroupNameRequired,
    GroupNameTaken,
    ConversationAlreadyExists,
    NotAGroup,
    NotCommentOwner,
    NotMessageOwner,
    SelfConversation,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Forbidden => "E0005",
            Self::BadRequest => "E0008",
            Self::PayloadTooLarge => "E0009",
            Self::UnsupportedMediaType => "E0010",
            Self::StorageError => "E0011",

            // Identity
            Self::TokenMissing => "E1001",
            Self::TokenMalformed => "E1002",
            Self::TokenInvalid => "E1003",
            Self::UserNotFound => "E1004",
            Self::UsernameTaken => "E1005",
            Self::InvalidUsername => "E1006",

            // Messaging
            Self::ConversationNotFound => "E4001",
            Self::NotConversationMember => "E4002",
            Self::MessageNotFound => "E4003",
            Self::GroupNameRequired => "E4004",
            Self::GroupNameTaken => "E4005",
            Self::ConversationAlreadyExists => "E4006",
            Self::NotAGroup => "E4007",
            Self::NotCommentOwner => "E4008",
            Self::NotMessageOwner => "E4009",
            Self::SelfConversation => "E4010",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InternalError | Self::StorageError => ErrorKind::Internal,
            Self::ValidationError | Self::BadRequest | Self::PayloadTooLarge
            | Self::UnsupportedMediaType | Self::InvalidUsername | Self::GroupNameRequired
            | Self::SelfConversation => ErrorKind::InvalidInput,
            Self::NotFound | Self::UserNotFound | Self::ConversationNotFound
            | Self::MessageNotFound => ErrorKind::NotFound,
            Self::TokenMissing | Self::TokenMalformed
            | Self::TokenInvalid => ErrorKind::Unauthenticated,
            Self::Forbidden | Self::NotConversationMember | Self::NotCommentOwner
            | Self::NotMessageOwner => ErrorKind::Forbidden,
            Self::UsernameTaken | Self::GroupNameTaken
            | Self::ConversationAlreadyExists => ErrorKind::Conflict,
            Self::NotAGroup => ErrorKind::InvalidOperation,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            other => other.kind().status_code(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// The fine-grained code, when the error carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Known { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Known { code, .. } => code.kind(),
            AppError::Internal(_) => ErrorKind::Internal,
            AppError::Database(diesel::result::Error::NotFound) => ErrorKind::NotFound,
            AppError::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => ErrorKind::Conflict,
            AppError::Database(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new(ErrorCode::InternalError.code(), "internal server error"),
                )
            }
            AppError::Database(err) => match self.kind() {
                ErrorKind::NotFound => (
                    StatusCode::NOT_FOUND,
                    ApiErrorResponse::new(ErrorCode::NotFound.code(), "resource not found"),
                ),
                ErrorKind::Conflict => (
                    StatusCode::CONFLICT,
                    ApiErrorResponse::new("E0012", "resource already exists"),
                ),
                _ => {
                    tracing::error!(error = %err, "database error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new(ErrorCode::InternalError.code(), "database error"),
                    )
                }
            },
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
