//! Aggregation of raw analytics rows into the dashboard summary
//!
//! Everything here is a pure function over rows that were already fetched
//! for one window. Counting keeps first-encounter order so that ranking with
//! a stable sort breaks ties by whichever value showed up first.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::analytics::classify::UNKNOWN;
use crate::analytics::models::{
    ActivityItem, AnalyticsEvent, AnalyticsSummary, CountedItem, DailyViews, PageView, Session,
};
use crate::analytics::range::TimeRange;

pub const TOP_PAGES_LIMIT: usize = 10;
pub const COUNTRIES_LIMIT: usize = 10;
pub const CITIES_LIMIT: usize = 10;
pub const BROWSERS_LIMIT: usize = 5;
pub const INTERACTIONS_LIMIT: usize = 5;
pub const TRAFFIC_SOURCES_LIMIT: usize = 5;
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

pub const DIRECT_SOURCE: &str = "Direct";

/// `round(100 * count / total)`, rounding half away from zero; 0 for an empty total
pub fn percentage(count: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (count as f64 * 100.0 / total as f64).round() as i64
}

/// Group values, rank by count descending (ties keep first-encounter order)
/// and attach the share of `total`.
pub fn rank_by_count<I, S>(values: I, total: i64, limit: Option<usize>) -> Vec<CountedItem>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts: Vec<(String, i64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for value in values {
        let value = value.as_ref();
        match positions.get(value) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                positions.insert(value.to_string(), counts.len());
                counts.push((value.to_string(), 1));
            }
        }
    }

    // sort_by is stable
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    if let Some(limit) = limit {
        counts.truncate(limit);
    }

    counts
        .into_iter()
        .map(|(name, count)| CountedItem {
            percentage: percentage(count, total),
            name,
            count,
        })
        .collect()
}

fn or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN,
    }
}

/// Referrer hostname without a leading `www.`, or "Direct" when absent
pub fn traffic_source(referrer: Option<&str>) -> String {
    let referrer = match referrer.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return DIRECT_SOURCE.to_string(),
    };

    match url::Url::parse(referrer) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.strip_prefix("www.").unwrap_or(host).to_string(),
            None => UNKNOWN.to_string(),
        },
        Err(_) => UNKNOWN.to_string(),
    }
}

/// Human name for a page path: "/" is "Home", "/case-studies" is "Case Studies"
pub fn page_name(path: &str) -> String {
    let trimmed = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_matches('/');
    if trimmed.is_empty() {
        return "Home".to_string();
    }

    trimmed
        .split(['/', '-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn utc_date(timestamp: i64) -> Option<NaiveDate> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.date_naive())
}

fn format_timestamp(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%b %-d, %Y %H:%M UTC").to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Views and sessions per UTC day for the last `range.chart_days()` days,
/// oldest first, ending with the day containing `now`.
pub fn daily_views(
    range: TimeRange,
    now: DateTime<Utc>,
    page_views: &[PageView],
    sessions: &[Session],
) -> Vec<DailyViews> {
    let mut views_by_day: HashMap<NaiveDate, i64> = HashMap::new();
    for view in page_views {
        if let Some(day) = utc_date(view.created_at) {
            *views_by_day.entry(day).or_insert(0) += 1;
        }
    }

    let mut sessions_by_day: HashMap<NaiveDate, i64> = HashMap::new();
    for session in sessions {
        if let Some(day) = utc_date(session.first_visit_at) {
            *sessions_by_day.entry(day).or_insert(0) += 1;
        }
    }

    let today = now.date_naive();
    (0..range.chart_days())
        .rev()
        .map(|offset| {
            let day = today - Duration::days(offset);
            DailyViews {
                date: day.format("%Y-%m-%d").to_string(),
                label: day.format("%b %-d").to_string(),
                views: views_by_day.get(&day).copied().unwrap_or(0),
                unique_visitors: sessions_by_day.get(&day).copied().unwrap_or(0),
            }
        })
        .collect()
}

fn recent_activity(page_views: &[PageView]) -> Vec<ActivityItem> {
    let skip = page_views.len().saturating_sub(RECENT_ACTIVITY_LIMIT);
    page_views[skip..]
        .iter()
        .rev()
        .map(|view| {
            let page = page_name(&view.page_path);
            ActivityItem {
                action: format!("Viewed {page}"),
                page,
                location: format!(
                    "{}, {}",
                    or_unknown(view.city.as_deref()),
                    or_unknown(view.country.as_deref())
                ),
                timestamp: format_timestamp(view.created_at),
                device_type: or_unknown(view.device_type.as_deref()).to_string(),
            }
        })
        .collect()
}

/// Compute the dashboard summary for one window of rows.
///
/// `page_views` must be in fetch order (oldest first); recent activity is
/// taken from its tail.
pub fn summarize(
    range: TimeRange,
    now: DateTime<Utc>,
    page_views: &[PageView],
    sessions: &[Session],
    events: &[AnalyticsEvent],
) -> AnalyticsSummary {
    let total_page_views = page_views.len() as i64;
    let unique_visitors = sessions.len() as i64;
    let total_events = events.len() as i64;

    let avg_session_duration = if sessions.is_empty() {
        0
    } else {
        let total: i64 = sessions.iter().map(|s| s.duration_seconds).sum();
        (total as f64 / sessions.len() as f64).round() as i64
    };

    let bounced = sessions.iter().filter(|s| s.bounce).count() as i64;
    let bounce_rate = percentage(bounced, unique_visitors);

    let top_pages = rank_by_count(
        page_views.iter().map(|v| v.page_path.as_str()),
        total_page_views,
        Some(TOP_PAGES_LIMIT),
    );
    let device_types = rank_by_count(
        page_views.iter().map(|v| or_unknown(v.device_type.as_deref())),
        total_page_views,
        None,
    );
    let browsers = rank_by_count(
        page_views.iter().map(|v| or_unknown(v.browser.as_deref())),
        total_page_views,
        Some(BROWSERS_LIMIT),
    );
    let countries = rank_by_count(
        page_views.iter().map(|v| or_unknown(v.country.as_deref())),
        total_page_views,
        Some(COUNTRIES_LIMIT),
    );
    let cities = rank_by_count(
        page_views.iter().map(|v| or_unknown(v.city.as_deref())),
        total_page_views,
        Some(CITIES_LIMIT),
    );
    let user_interactions = rank_by_count(
        events.iter().map(|e| e.event_type.as_str()),
        total_events,
        Some(INTERACTIONS_LIMIT),
    );
    let traffic_sources = rank_by_count(
        page_views
            .iter()
            .map(|v| traffic_source(v.referrer.as_deref())),
        total_page_views,
        Some(TRAFFIC_SOURCES_LIMIT),
    );

    AnalyticsSummary {
        total_page_views,
        unique_visitors,
        avg_session_duration,
        bounce_rate,
        top_pages,
        device_types,
        countries,
        cities,
        browsers,
        daily_views: daily_views(range, now, page_views, sessions),
        user_interactions,
        traffic_sources,
        recent_activity: recent_activity(page_views),
    }
}
