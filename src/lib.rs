//! Real-time order notifications built with Rust.
//!
//! Publishes order and application events onto a broker, streams relevant
//! application events to admins over server-sent events, keeps unread
//! counters, and runs a room-based order socket with a matching client.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod socket;

pub use client::OrderSocketClient;
pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use services::{NotificationService, Publisher, UnreadCounter};

use axum::routing::{get, post};
use handlers::http;

/// Build the router (order socket, notification stream, publish API, health).
/// Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    let notification_routes = axum::Router::new()
        .route("/stream", get(handlers::notification_stream))
        .route("/unread", get(http::unread_count))
        .route("/unread/reset", post(http::reset_unread));

    axum::Router::new()
        .route("/orders", get(socket::orders_socket))
        .route("/api/publish", post(http::publish))
        .route("/api/applications/events", post(http::application_event))
        .route("/health", get(http::health))
        .nest("/api/notifications", notification_routes)
        .with_state(state)
}
