//! Per-viewer load sequencing for the dashboard summary
//!
//! Every load takes a fresh generation for its viewer. A load that finishes
//! after a newer one for the same viewer has started reports `Superseded`
//! instead of its result.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;

use crate::analytics::models::AnalyticsSummary;
use crate::analytics::range::TimeRange;
use crate::analytics::service::AnalyticsService;

#[derive(Debug)]
pub enum LoadOutcome {
    Fresh(AnalyticsSummary),
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    viewer: String,
    generation: u64,
}

pub struct SummaryLoader {
    service: AnalyticsService,
    next_generation: AtomicU64,
    latest: DashMap<String, u64>,
}

impl SummaryLoader {
    pub fn new(service: AnalyticsService) -> Self {
        Self {
            service,
            next_generation: AtomicU64::new(0),
            latest: DashMap::new(),
        }
    }

    pub fn begin(&self, viewer: &str) -> LoadTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest.insert(viewer.to_string(), generation);
        LoadTicket {
            viewer: viewer.to_string(),
            generation,
        }
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.latest
            .get(&ticket.viewer)
            .is_some_and(|g| *g == ticket.generation)
    }

    /// Drops the viewer's entry if this ticket is still the newest.
    fn finish(&self, ticket: &LoadTicket) -> bool {
        self.latest
            .remove_if(&ticket.viewer, |_, g| *g == ticket.generation)
            .is_some()
    }

    pub async fn load(&self, viewer: &str, range: TimeRange) -> Result<LoadOutcome> {
        let ticket = self.begin(viewer);
        let result = self.service.load(range, Utc::now()).await;

        if !self.finish(&ticket) {
            tracing::debug!(viewer, "discarding superseded analytics load");
            return Ok(LoadOutcome::Superseded);
        }
        result.map(LoadOutcome::Fresh)
    }
}
