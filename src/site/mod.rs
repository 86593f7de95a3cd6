//! Public marketing site: pages, tracking and the contact proxy

pub mod routes;
pub mod static_files;
pub mod track;

use crate::analytics::{EventRecorder, ProxyTrust};

pub use routes::create_site_router;

pub struct SiteState {
    pub recorder: EventRecorder,
    pub proxy: ProxyTrust,
    /// Overrides the embedded pages when set
    pub static_dir: Option<String>,
}
