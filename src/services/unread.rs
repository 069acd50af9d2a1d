//! Per-user unread notification counters.

use std::sync::Arc;

use tracing::instrument;

use crate::error::AppResult;
use crate::repositories::CounterStore;

const UNREAD_PREFIX: &str = "unread:";

fn unread_key(user_id: &str) -> String {
    format!("{}{}", UNREAD_PREFIX, user_id)
}

/// Tally of events dispatched to a user since their last "mark all read".
/// Independent of whether any live stream is connected.
#[derive(Clone)]
pub struct UnreadCounter {
    store: Arc<dyn CounterStore>,
}

impl UnreadCounter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn increment(&self, user_id: &str) -> AppResult<i64> {
        self.store.incr(&unread_key(user_id)).await
    }

    /// Current count; 0 for users never notified.
    pub async fn get(&self, user_id: &str) -> AppResult<i64> {
        self.store.get(&unread_key(user_id)).await
    }

    #[instrument(skip(self))]
    pub async fn reset(&self, user_id: &str) -> AppResult<()> {
        self.store.del(&unread_key(user_id)).await
    }
}
