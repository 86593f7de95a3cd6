use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use repdesk::analytics::{EventRecorder, GeoIpService, ProxyTrust};
use repdesk::api;
use repdesk::auth::AuthService;
use repdesk::config::Config;
use repdesk::contact::{ContactState, HubSpotClient};
use repdesk::cursor::CursorSigner;
use repdesk::error::panic_response;
use repdesk::site::{self, SiteState};
use repdesk::storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = storage::open(&config.database).await?;
    info!("Database initialized");

    let auth_service = Arc::new(AuthService::from_config(&config.auth, Arc::clone(&storage)).await?);

    let geoip = match config.tracking.geoip_city_db_path.as_deref() {
        Some(path) => match GeoIpService::open(path) {
            Ok(service) => {
                info!("GeoIP lookups enabled from {path}");
                Some(service)
            }
            Err(e) => {
                warn!("GeoIP disabled: {e:#}");
                None
            }
        },
        None => None,
    };

    if !config.tracking.enabled {
        info!("Page analytics recording is disabled");
    }

    let site_state = Arc::new(SiteState {
        recorder: EventRecorder::new(Arc::clone(&storage), &config.tracking, geoip),
        proxy: ProxyTrust::from_config(&config.tracking),
        static_dir: config.frontend.static_dir.clone(),
    });
    let contact_state = Arc::new(ContactState {
        crm: Arc::new(HubSpotClient::new(config.crm.clone())?),
    });
    if config.crm.private_app_token.is_none() {
        warn!("CRM_PRIVATE_APP_TOKEN not set; contact form submissions will fail");
    }

    match &config.frontend.static_dir {
        Some(dir) => info!("Serving site pages from directory: {dir}"),
        None => info!("Serving embedded site pages"),
    }

    let site_router = site::create_site_router(site_state, contact_state);
    let api_router = api::create_api_router(
        Arc::clone(&storage),
        auth_service,
        CursorSigner::new(config.pagination.cursor_hmac_secret.as_deref()),
    )
    .layer(CatchPanicLayer::custom(panic_response))
    .layer(CorsLayer::permissive());

    let site_addr = format!("{}:{}", config.site_server.host, config.site_server.port);
    let site_listener = tokio::net::TcpListener::bind(&site_addr).await?;
    info!("Site server listening on http://{site_addr}");

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("Dashboard API listening on http://{api_addr}/api/...");

    tokio::try_join!(
        axum::serve(
            site_listener,
            site_router.into_make_service_with_connect_info::<SocketAddr>()
        ),
        axum::serve(api_listener, api_router),
    )?;

    Ok(())
}
