use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, MethodRouter},
    Router,
};

use super::handlers::{self, ContactState};

/// Adds the shared `OPTIONS` and 405 handling to an endpoint
fn endpoint(router: MethodRouter<Arc<ContactState>>) -> MethodRouter<Arc<ContactState>> {
    router
        .options(handlers::preflight)
        .fallback(handlers::method_not_allowed)
}

pub fn create_contact_routes(state: Arc<ContactState>) -> Router {
    Router::new()
        .route("/contact", endpoint(post(handlers::submit_contact)))
        .route("/oauth/authorize", endpoint(get(handlers::authorize)))
        .route("/oauth/token", endpoint(post(handlers::exchange_token)))
        .route(
            "/crm/contacts",
            endpoint(get(handlers::list_remote_contacts).post(handlers::create_remote_contact)),
        )
        .route(
            "/crm/contacts/{id}",
            endpoint(patch(handlers::update_remote_contact)),
        )
        .layer(middleware::map_response(handlers::allow_any_origin))
        .with_state(state)
}
