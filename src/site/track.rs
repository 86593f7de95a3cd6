//! Browser-facing analytics endpoints
//!
//! These always answer 200: tracking must never surface an error to a visitor.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::SiteState;
use crate::analytics::{Interaction, Navigation, RecordOutcome, SessionContext};

/// Peer address when the server was started with connect info
pub struct ClientAddr(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub query: Option<String>,
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub viewport_width: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub query: Option<String>,
    pub path: String,
    pub event_type: String,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub session_id: Option<String>,
    pub recorded: bool,
}

impl TrackResponse {
    fn from_outcome(session: &SessionContext, outcome: RecordOutcome) -> Self {
        Self {
            session_id: session.token().map(str::to_string),
            recorded: matches!(outcome, RecordOutcome::Recorded { .. }),
        }
    }

    fn ignored(session_id: Option<String>) -> Self {
        Self {
            session_id,
            recorded: false,
        }
    }
}

fn header_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn track_page_view(
    State(state): State<Arc<SiteState>>,
    ClientAddr(peer): ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Json<TrackResponse> {
    let request: TrackRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("ignoring malformed track request: {e}");
            return Json(TrackResponse::ignored(None));
        }
    };

    let mut session = SessionContext::resume(request.session_id);
    let navigation = Navigation {
        hostname: request.hostname,
        query: request.query,
        path: request.path,
        title: request.title,
        referrer: request.referrer,
        user_agent: request.user_agent.or_else(|| header_user_agent(&headers)),
        viewport_width: request.viewport_width,
    };
    let client_ip = peer.map(|addr| state.proxy.client_ip(&headers, addr));

    let outcome = state
        .recorder
        .record_page_view(&mut session, &navigation, client_ip)
        .await;
    Json(TrackResponse::from_outcome(&session, outcome))
}

pub async fn track_event(State(state): State<Arc<SiteState>>, body: Bytes) -> Json<TrackResponse> {
    let request: EventRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("ignoring malformed event request: {e}");
            return Json(TrackResponse::ignored(None));
        }
    };

    let session = SessionContext::resume(request.session_id);
    let interaction = Interaction {
        hostname: request.hostname,
        query: request.query,
        path: request.path,
        event_type: request.event_type,
        event_data: request.event_data,
    };

    let outcome = state.recorder.record_interaction(&session, &interaction).await;
    Json(TrackResponse::from_outcome(&session, outcome))
}
