use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod extract;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod storage;

use config::AppConfig;
use parlor_shared::clients::db::DbPool;
use storage::{BlobStore, UPLOADS_ROUTE};

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub storage: BlobStore,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        // Health
        .route("/liveness", get(routes::health::liveness))
        .route("/health", get(routes::health::health_check))
        // Identity
        .route("/session", post(routes::session::login))
        .route("/users/me/username", put(routes::users::set_my_username))
        .route("/users/me/photo", put(routes::users::set_my_photo))
        .route("/users/:id", get(routes::users::get_user))
        .route("/search/users", get(routes::users::search_user))
        // Conversations
        .route("/users/:id/conversations", get(routes::users::list_conversations))
        .route("/users/:id/conversations/first-message", post(routes::users::send_first_message))
        .route("/conversations/:id", get(routes::conversations::get_conversation))
        .route("/conversations/:id/set-group-photo", put(routes::conversations::set_group_photo))
        // Messages
        .route("/conversations/:id/messages", post(routes::messages::send_message))
        .route("/conversations/:id/messages/:mid", delete(routes::messages::delete_message))
        .route("/conversations/:id/messages/:mid/forward/:target", post(routes::messages::forward_message))
        // Comments
        .route("/conversations/:id/messages/:mid/comments", post(routes::comments::comment_message))
        .route("/conversations/:id/messages/:mid/comments/:cid", delete(routes::comments::uncomment_message))
        .route("/messages/:mid/comments", get(routes::comments::list_comments))
        // Groups
        .route("/groups", post(routes::groups::create_group))
        .route("/groups/:id/members", post(routes::groups::add_to_group))
        .route("/groups/:id/leave", delete(routes::groups::leave_group))
        .route("/groups/:id/name", put(routes::groups::set_group_name));

    if let Some(root) = state.storage.local_root() {
        app = app.nest_service(UPLOADS_ROUTE, ServeDir::new(root));
    }

    app.layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
