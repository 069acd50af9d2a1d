//! HTTP handlers: backend publish endpoints, unread counters and health.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use tracing::info;

use crate::auth::JwtSecret;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware::{require_app_key, AuthUser};
use crate::models::{ApplicationEvent, Channel, PublishRequest};
use crate::repositories::{Broker, CounterStore};
use crate::services::{NotificationService, Publisher, UnreadCounter};
use crate::socket::RoomRegistry;

/// Shared application state for HTTP, server-push and socket handlers.
#[derive(Clone)]
pub struct AppState {
    pub app_key: String,
    pub broker: Arc<dyn Broker>,
    pub publisher: Publisher,
    pub notifications: NotificationService,
    pub unread: UnreadCounter,
    pub jwt_secret: JwtSecret,
    pub rooms: Arc<RoomRegistry>,
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(
        config: &Config,
        broker: Arc<dyn Broker>,
        counters: Arc<dyn CounterStore>,
        rooms: Arc<RoomRegistry>,
    ) -> Self {
        let publisher = Publisher::new(broker.clone());
        let unread = UnreadCounter::new(counters);
        Self {
            app_key: config.app_key.clone(),
            notifications: NotificationService::new(publisher.clone(), unread.clone()),
            publisher,
            unread,
            broker,
            jwt_secret: JwtSecret::new(config.jwt_secret.clone()),
            rooms,
            keep_alive: config.keep_alive,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }
    pub fn jwt_secret(&self) -> &JwtSecret {
        &self.jwt_secret
    }
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }
}

/// POST /api/publish: raw publish onto a registered channel.
/// Requires header: x-app-key: <app_key>.
pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PublishRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_app_key(&headers, &state.app_key)?;
    let channel: Channel = body.channel.parse()?;

    let delivered = state
        .publisher
        .publish_raw(channel, &body.payload.to_string())
        .await;

    Ok(Json(json!({
        "ok": delivered.is_some(),
        "channel": channel,
        "subscriber_count": delivered.unwrap_or(0)
    })))
}

/// POST /api/applications/events: a typed application event for admins.
/// Bumps unread counters, then publishes. Requires x-app-key and a
/// non-empty adminIds.
pub async fn application_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ApplicationEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_app_key(&headers, &state.app_key)?;
    let application_id = match &event {
        ApplicationEvent::NewApplication(e) => &e.application_id,
        ApplicationEvent::ApplicationUpdate(e) => &e.application_id,
    };
    if application_id.trim().is_empty() {
        return Err(AppError::Validation("applicationId must not be empty".to_string()));
    }

    let channel = event.channel();
    let admins = event.admin_ids().len();
    let delivered = state.notifications.dispatch(event).await?;

    Ok(Json(json!({
        "ok": delivered.is_some(),
        "channel": channel,
        "admins": admins,
        "subscriber_count": delivered.unwrap_or(0)
    })))
}

/// GET /api/notifications/unread
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.unread.get(&identity.user_id).await?;
    Ok(Json(json!({ "userId": identity.user_id, "count": count })))
}

/// POST /api/notifications/unread/reset
pub async fn reset_unread(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state.unread.reset(&identity.user_id).await?;
    info!(user_id = %identity.user_id, "unread counter reset");
    Ok(Json(json!({ "userId": identity.user_id, "count": 0 })))
}

/// GET /health: liveness probe.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "orderwire" })),
    )
}
