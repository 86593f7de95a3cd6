//! Data models for analytics

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Geographic location information derived from IP address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country_code: Option<String>,

    /// Country name
    pub country_name: Option<String>,

    /// City name
    pub city: Option<String>,
}

/// One row per tracked navigation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageView {
    pub id: i64,
    pub session_id: String,
    pub page_path: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub operating_system: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewPageView {
    pub session_id: String,
    pub page_path: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: String,
    pub browser: String,
    pub operating_system: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub created_at: i64,
}

/// One row per browsing session
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub session_id: String,
    pub first_visit_at: i64,
    pub last_activity_at: i64,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub referrer: Option<String>,
    pub duration_seconds: i64,
    pub bounce: bool,
    pub page_views_count: i64,
}

/// What a follow-up page view learns about the session it extends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchedSession {
    /// Referrer the session was opened with
    pub referrer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: String,
    pub started_at: i64,
    pub device_type: String,
    pub browser: String,
    pub referrer: Option<String>,
}

/// Tracked interaction (page view, button click, ...)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub session_id: String,
    pub event_type: String,
    pub page_path: String,
    pub event_data: Json<serde_json::Value>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub session_id: String,
    pub event_type: String,
    pub page_path: String,
    pub event_data: serde_json::Value,
    pub created_at: i64,
}

/// Count of one dimension value within a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountedItem {
    pub name: String,
    pub count: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyViews {
    /// ISO date (YYYY-MM-DD, UTC)
    pub date: String,
    /// Short chart label ("Oct 16")
    pub label: String,
    pub views: i64,
    pub unique_visitors: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub action: String,
    pub page: String,
    pub location: String,
    pub timestamp: String,
    pub device_type: String,
}

/// Dashboard summary for one window; never persisted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_page_views: i64,
    pub unique_visitors: i64,
    pub avg_session_duration: i64,
    pub bounce_rate: i64,
    pub top_pages: Vec<CountedItem>,
    pub device_types: Vec<CountedItem>,
    pub countries: Vec<CountedItem>,
    pub cities: Vec<CountedItem>,
    pub browsers: Vec<CountedItem>,
    pub daily_views: Vec<DailyViews>,
    pub user_interactions: Vec<CountedItem>,
    pub traffic_sources: Vec<CountedItem>,
    pub recent_activity: Vec<ActivityItem>,
}
