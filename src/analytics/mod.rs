//! First-party page analytics
//!
//! Recording happens on the public site router; the summary is computed on
//! demand for the admin dashboard and never cached.

pub mod classify;
pub mod geoip;
pub mod ip_extractor;
pub mod loader;
pub mod models;
pub mod range;
pub mod recorder;
pub mod service;
pub mod summary;

pub use geoip::GeoIpService;
pub use ip_extractor::ProxyTrust;
pub use loader::{LoadOutcome, SummaryLoader};
pub use models::{AnalyticsSummary, GeoLocation};
pub use range::TimeRange;
pub use recorder::{EventRecorder, Interaction, Navigation, RecordOutcome, SessionContext};
pub use service::AnalyticsService;
