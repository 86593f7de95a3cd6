//! Best-effort recording of page views and interactions
//!
//! The recorder never fails its caller: every storage error is logged at
//! debug level and dropped. Loads from development hosts or preview links
//! are skipped before anything is written.

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::analytics::classify;
use crate::analytics::geoip::GeoIpService;
use crate::analytics::models::{GeoLocation, NewEvent, NewPageView, NewSession};
use crate::config::TrackingConfig;
use crate::storage::Storage;

pub const PAGE_VIEW_EVENT: &str = "page_view";

const DEV_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "::1"];
const DEV_HOST_SUFFIXES: &[&str] = &[".local", ".localhost"];
const PREVIEW_HOST_MARKERS: &[&str] = &["preview", "staging"];
const PREVIEW_QUERY_KEYS: &[&str] = &["preview", "__preview"];

/// What the browser reports about one navigation
#[derive(Debug, Clone)]
pub struct Navigation {
    pub hostname: String,
    pub query: Option<String>,
    pub path: String,
    pub title: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub viewport_width: Option<u32>,
}

/// A tracked interaction other than a page view (button click, form open, ...)
#[derive(Debug, Clone)]
pub struct Interaction {
    pub hostname: String,
    pub query: Option<String>,
    pub path: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

/// Session token scoped to one browsing session.
///
/// The token is created at most once, on the first recorded navigation, and
/// read on every later one. Callers hand it back in on each request.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    token: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(token: Option<String>) -> Self {
        Self {
            token: token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the token and whether it was created by this call.
    fn get_or_create(&mut self) -> (String, bool) {
        match &self.token {
            Some(token) => (token.clone(), false),
            None => {
                let token = uuid::Uuid::new_v4().to_string();
                self.token = Some(token.clone());
                (token, true)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Skipped,
    Recorded { new_session: bool },
}

pub struct EventRecorder {
    storage: Arc<dyn Storage>,
    enabled: bool,
    ignored_hosts: Vec<String>,
    geoip: Option<GeoIpService>,
}

impl EventRecorder {
    pub fn new(
        storage: Arc<dyn Storage>,
        config: &TrackingConfig,
        geoip: Option<GeoIpService>,
    ) -> Self {
        Self {
            storage,
            enabled: config.enabled,
            ignored_hosts: config
                .ignored_hosts
                .iter()
                .map(|h| h.trim().to_lowercase())
                .collect(),
            geoip,
        }
    }

    pub fn should_skip(&self, hostname: &str, query: Option<&str>) -> bool {
        !self.enabled
            || is_development_host(hostname, &self.ignored_hosts)
            || query.is_some_and(is_preview_query)
    }

    /// Record one navigation: a session row for a new session, then a page
    /// view and a `page_view` event.
    pub async fn record_page_view(
        &self,
        session: &mut SessionContext,
        nav: &Navigation,
        client_ip: Option<IpAddr>,
    ) -> RecordOutcome {
        if self.should_skip(&nav.hostname, nav.query.as_deref()) {
            debug!(hostname = %nav.hostname, "skipping analytics for development or preview load");
            return RecordOutcome::Skipped;
        }

        let now = chrono::Utc::now().timestamp();
        let user_agent = nav.user_agent.as_deref().unwrap_or_default();
        let device_type = nav
            .viewport_width
            .map_or(classify::UNKNOWN, classify::device_type);
        let browser = classify::browser(user_agent);
        let mut referrer = external_referrer(nav.referrer.as_deref(), &nav.hostname);

        let (session_id, new_session) = session.get_or_create();
        if new_session {
            let row = NewSession {
                session_id: session_id.clone(),
                started_at: now,
                device_type: device_type.to_string(),
                browser: browser.to_string(),
                referrer: referrer.clone(),
            };
            if let Err(e) = self.storage.insert_session(&row).await {
                debug!(error = %e, "failed to insert analytics session");
            }
        } else {
            match self.storage.touch_session(&session_id, now).await {
                // internal navigation keeps the source the visit arrived from
                Ok(Some(touched)) => {
                    if referrer.is_none() {
                        referrer = touched.referrer;
                    }
                }
                Ok(None) => debug!(%session_id, "page view for unknown analytics session"),
                Err(e) => debug!(error = %e, "failed to update analytics session"),
            }
        }

        let location = match (&self.geoip, client_ip) {
            (Some(geoip), Some(ip)) => geoip.lookup(ip),
            _ => GeoLocation::default(),
        };

        let view = NewPageView {
            session_id: session_id.clone(),
            page_path: nav.path.clone(),
            page_title: nav.title.clone(),
            referrer,
            user_agent: nav.user_agent.clone(),
            device_type: device_type.to_string(),
            browser: browser.to_string(),
            operating_system: classify::operating_system(user_agent).to_string(),
            country: location.country_label(),
            city: location.city.clone(),
            created_at: now,
        };
        if let Err(e) = self.storage.insert_page_view(&view).await {
            debug!(error = %e, "failed to insert page view");
        }

        let event = NewEvent {
            session_id,
            event_type: PAGE_VIEW_EVENT.to_string(),
            page_path: nav.path.clone(),
            event_data: json!({ "title": nav.title }),
            created_at: now,
        };
        if let Err(e) = self.storage.insert_event(&event).await {
            debug!(error = %e, "failed to insert page view event");
        }

        RecordOutcome::Recorded { new_session }
    }

    /// Record a non-navigation event. Interactions never open a session, so
    /// one without a session token is skipped.
    pub async fn record_interaction(
        &self,
        session: &SessionContext,
        interaction: &Interaction,
    ) -> RecordOutcome {
        if self.should_skip(&interaction.hostname, interaction.query.as_deref()) {
            return RecordOutcome::Skipped;
        }
        let Some(session_id) = session.token() else {
            debug!(event_type = %interaction.event_type, "interaction without a session");
            return RecordOutcome::Skipped;
        };

        let event = NewEvent {
            session_id: session_id.to_string(),
            event_type: interaction.event_type.clone(),
            page_path: interaction.path.clone(),
            event_data: interaction.event_data.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.storage.insert_event(&event).await {
            debug!(error = %e, "failed to insert interaction event");
        }

        RecordOutcome::Recorded { new_session: false }
    }
}

/// Hostname without port or IPv6 brackets, lowercased
fn bare_host(hostname: &str) -> String {
    let host = hostname.trim().to_lowercase();
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    match host.split_once(':') {
        // a single colon is a port separator; more means a bare IPv6 address
        Some((name, port)) if !port.contains(':') => name.to_string(),
        _ => host,
    }
}

/// Host compared between a referrer and the page: no port, no leading `www.`
fn site_host(hostname: &str) -> String {
    let host = bare_host(hostname);
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// The referrer, unless it is empty or points back at the site itself
fn external_referrer(referrer: Option<&str>, hostname: &str) -> Option<String> {
    let referrer = referrer.map(str::trim).filter(|r| !r.is_empty())?;
    let internal = url::Url::parse(referrer)
        .ok()
        .and_then(|url| url.host_str().map(|host| site_host(host) == site_host(hostname)))
        .unwrap_or(false);
    (!internal).then(|| referrer.to_string())
}

pub fn is_development_host(hostname: &str, extra: &[String]) -> bool {
    let host = bare_host(hostname);
    if host.is_empty() {
        return true;
    }

    DEV_HOSTS.contains(&host.as_str())
        || DEV_HOST_SUFFIXES.iter().any(|s| host.ends_with(s))
        || PREVIEW_HOST_MARKERS.iter().any(|m| host.contains(m))
        || extra.iter().any(|entry| match entry.strip_prefix('.') {
            Some(_) => host.ends_with(entry.as_str()),
            None => host == *entry,
        })
}

pub fn is_preview_query(query: &str) -> bool {
    let query = query.trim_start_matches('?');
    url::form_urlencoded::parse(query.as_bytes()).any(|(key, value)| {
        PREVIEW_QUERY_KEYS.iter().any(|k| *k == key) && value != "false" && value != "0"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_hosts_are_detected() {
        let none: Vec<String> = Vec::new();
        assert!(is_development_host("localhost:3000", &none));
        assert!(is_development_host("LOCALHOST", &none));
        assert!(is_development_host("127.0.0.1:8080", &none));
        assert!(is_development_host("[::1]:3000", &none));
        assert!(is_development_host("my-mac.local", &none));
        assert!(is_development_host("id-preview--abc.example.app", &none));
        assert!(is_development_host("staging.repdesk.example", &none));
        assert!(is_development_host("", &none));

        assert!(!is_development_host("repdesk.example", &none));
        assert!(!is_development_host("www.repdesk.example:443", &none));
    }

    #[test]
    fn extra_ignored_hosts() {
        let extra = vec!["qa.repdesk.example".to_string(), ".internal".to_string()];
        assert!(is_development_host("qa.repdesk.example", &extra));
        assert!(is_development_host("box.internal:8080", &extra));
        assert!(!is_development_host("repdesk.example", &extra));
    }

    #[test]
    fn preview_query_markers() {
        assert!(is_preview_query("?preview=true"));
        assert!(is_preview_query("utm_source=x&__preview"));
        assert!(!is_preview_query("preview=false"));
        assert!(!is_preview_query("?utm_source=newsletter"));
        assert!(!is_preview_query(""));
    }

    #[test]
    fn same_site_referrers_are_dropped() {
        let page = "repdesk.example";
        assert_eq!(external_referrer(Some("https://repdesk.example/about"), page), None);
        assert_eq!(
            external_referrer(Some("https://www.repdesk.example/"), "repdesk.example:443"),
            None
        );
        assert_eq!(
            external_referrer(Some("http://repdesk.example:8080/x"), "www.repdesk.example"),
            None
        );
        assert_eq!(external_referrer(Some("  "), page), None);
        assert_eq!(external_referrer(None, page), None);

        assert_eq!(
            external_referrer(Some("https://www.google.com/"), page).as_deref(),
            Some("https://www.google.com/")
        );
        assert_eq!(
            external_referrer(Some("https://blog.repdesk.example/"), page).as_deref(),
            Some("https://blog.repdesk.example/")
        );
        // unparseable values are kept and counted as an unknown source
        assert_eq!(external_referrer(Some("not a url"), page).as_deref(), Some("not a url"));
    }

    #[test]
    fn session_token_is_created_once() {
        let mut session = SessionContext::new();
        assert!(session.token().is_none());

        let (first, created) = session.get_or_create();
        assert!(created);
        let (second, created_again) = session.get_or_create();
        assert!(!created_again);
        assert_eq!(first, second);
        assert_eq!(session.token(), Some(first.as_str()));

        assert!(SessionContext::resume(Some("  ".to_string())).token().is_none());
        assert_eq!(
            SessionContext::resume(Some("abc".to_string())).token(),
            Some("abc")
        );
    }
}
