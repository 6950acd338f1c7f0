use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request state threaded explicitly through every service operation.
///
/// Carries the correlation id used in every log line of the request and,
/// once authentication succeeded, the caller's user id.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: None,
        }
    }

    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            user_id: None,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Span for one service operation. Enter it for the duration of the call.
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "op",
            operation = operation,
            req_id = %self.request_id,
            user = self.user_id.as_deref().unwrap_or("-"),
        )
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // several extractors may ask for the context; they must share one id
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }

        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .unwrap_or_else(Uuid::new_v4);

        let ctx = RequestContext::with_request_id(request_id);
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}
