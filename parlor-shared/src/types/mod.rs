pub mod api;
pub mod auth;
pub mod context;

pub use api::*;
pub use auth::*;
pub use context::*;
