//! Restaurant-application notifications for admins.

use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::models::{ApplicationEvent, ApplicationUpdate, NewApplication};
use crate::services::{Publisher, UnreadCounter};

/// Publishes application events and bumps each targeted admin's unread
/// counter, so admins who are offline still see a badge.
#[derive(Clone)]
pub struct NotificationService {
    publisher: Publisher,
    unread: UnreadCounter,
}

impl NotificationService {
    pub fn new(publisher: Publisher, unread: UnreadCounter) -> Self {
        Self { publisher, unread }
    }

    pub async fn application_submitted(&self, application: NewApplication) -> AppResult<Option<u64>> {
        self.dispatch(ApplicationEvent::NewApplication(application)).await
    }

    pub async fn application_reviewed(&self, update: ApplicationUpdate) -> AppResult<Option<u64>> {
        self.dispatch(ApplicationEvent::ApplicationUpdate(update)).await
    }

    /// Count first, then publish: a badge that is one ahead of the live
    /// stream is harmless, one behind is a missed notification.
    ///
    /// An event must name its admins; with none there is no counter to
    /// bump and offline admins would never learn of it.
    #[instrument(skip(self, event), fields(channel = %event.channel()))]
    pub async fn dispatch(&self, event: ApplicationEvent) -> AppResult<Option<u64>> {
        if event.admin_ids().iter().all(|id| id.trim().is_empty()) {
            return Err(AppError::Validation("adminIds must name at least one admin".to_string()));
        }
        for admin_id in event.admin_ids() {
            if let Err(e) = self.unread.increment(admin_id).await {
                warn!(admin_id = %admin_id, error = %e, "unread counter not incremented");
            }
        }
        let delivered = self.publisher.publish(event.channel(), &event).await;
        info!(targets = event.admin_ids().len(), ?delivered, "application notification dispatched");
        Ok(delivered)
    }
}
