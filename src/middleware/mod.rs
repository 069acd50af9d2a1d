//! Request authentication shared by the HTTP and socket handlers.

pub mod auth;

pub use auth::{bearer_token, require_app_key, AdminUser, AuthUser};
