//! Analytics dashboard handler

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::handlers::AppState;
use crate::analytics::{AnalyticsSummary, LoadOutcome, TimeRange};
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// `1d`, `7d`, `30d`, `90d`, `180d`, `365d` or `all`; defaults to 7 days
    pub range: Option<String>,
}

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<AnalyticsSummary>> {
    let range = match query.range.as_deref().map(str::trim) {
        None | Some("") => TimeRange::default(),
        Some(raw) => raw
            .parse::<TimeRange>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };

    match state.loader.load(&principal.user_id, range).await? {
        LoadOutcome::Fresh(summary) => Ok(Json(summary)),
        LoadOutcome::Superseded => Err(ApiError::Conflict(
            "Superseded by a newer analytics request".to_string(),
        )),
    }
}
