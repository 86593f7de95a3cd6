use axum::{routing::post, Router};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};

use super::static_files::serve_site;
use super::track::{track_event, track_page_view};
use super::SiteState;
use crate::contact::{create_contact_routes, ContactState};
use crate::error::panic_response;

/// Pages and tracking get the permissive CORS layer; the contact proxy
/// answers its own preflights.
pub fn create_site_router(state: Arc<SiteState>, contact: Arc<ContactState>) -> Router {
    Router::new()
        .route("/api/track", post(track_page_view))
        .route("/api/track/event", post(track_event))
        .fallback(serve_site)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .merge(create_contact_routes(contact))
        .layer(CatchPanicLayer::custom(panic_response))
}
