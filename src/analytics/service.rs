use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::analytics::models::AnalyticsSummary;
use crate::analytics::range::TimeRange;
use crate::analytics::summary::summarize;
use crate::storage::Storage;

/// Loads the dashboard summary straight from storage on every call.
#[derive(Clone)]
pub struct AnalyticsService {
    storage: Arc<dyn Storage>,
}

impl AnalyticsService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Fetch the window's page views, sessions and events concurrently.
    /// Any failed fetch fails the whole load.
    pub async fn load(&self, range: TimeRange, now: DateTime<Utc>) -> Result<AnalyticsSummary> {
        let since = range.window_start(now).timestamp();

        let (page_views, sessions, events) = tokio::try_join!(
            async {
                self.storage
                    .page_views_since(since)
                    .await
                    .context("Failed to load page views")
            },
            async {
                self.storage
                    .sessions_since(since)
                    .await
                    .context("Failed to load sessions")
            },
            async {
                self.storage
                    .events_since(since)
                    .await
                    .context("Failed to load events")
            },
        )?;

        Ok(summarize(range, now, &page_views, &sessions, &events))
    }
}
