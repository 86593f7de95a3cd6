use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::analytics::{AnalyticsService, SummaryLoader};
use crate::auth::{auth_middleware, AuthService};
use crate::cursor::CursorSigner;
use crate::storage::Storage;

use super::analytics::get_summary;
use super::auth::{me, sign_in, sign_up};
use super::handlers::{
    create_account, create_contact, delete_account, delete_contact, get_account, get_contact,
    health_check, list_accounts, list_contacts, update_account, update_contact, AppState,
};

pub fn create_api_router(
    storage: Arc<dyn Storage>,
    auth_service: Arc<AuthService>,
    cursor: CursorSigner,
) -> Router {
    let loader = SummaryLoader::new(AnalyticsService::new(Arc::clone(&storage)));
    let state = Arc::new(AppState {
        storage,
        cursor,
        auth: Arc::clone(&auth_service),
        loader,
    });

    let protected_routes = Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/analytics/summary", get(get_summary))
        .route("/api/contacts", get(list_contacts).post(create_contact))
        .route(
            "/api/contacts/{id}",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .route("/api/accounts", get(list_accounts).post(create_account))
        .route(
            "/api/accounts/{id}",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route_layer(middleware::from_fn_with_state(auth_service, auth_middleware))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-up", post(sign_up))
        .with_state(state)
        .merge(protected_routes)
}
