use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::client::{ContactProperties, CrmClient, CrmError, TokenGrant};
use crate::auth::bearer_token;
use crate::error::{parse_json, ApiError, ApiResult};
use crate::models::{is_valid_email, non_empty};

pub struct ContactState {
    pub crm: Arc<dyn CrmClient>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ContactForm {
    /// Trimmed properties, or the reason the form cannot be sent upstream
    pub fn into_properties(self) -> ApiResult<ContactProperties> {
        let firstname = non_empty(self.firstname);
        let lastname = non_empty(self.lastname);
        let email = non_empty(self.email);

        let missing: Vec<&str> = [
            ("firstname", firstname.is_none()),
            ("lastname", lastname.is_none()),
            ("email", email.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let email = email.unwrap_or_default();
        if !is_valid_email(&email) {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }

        Ok(ContactProperties {
            email,
            firstname,
            lastname,
            company: non_empty(self.company),
            message: non_empty(self.message),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
    pub contact_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub code: Option<String>,
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Upstream { status, message } => match status {
                400 => ApiError::BadRequest(message),
                401 => ApiError::Unauthorized(message),
                403 => ApiError::Forbidden(message),
                404 => ApiError::NotFound(message),
                _ => {
                    warn!("CRM upstream error {status}: {message}");
                    ApiError::BadGateway("Contact service error".to_string())
                }
            },
            CrmError::Conflict { .. } => ApiError::Conflict("Contact already exists".to_string()),
            other => ApiError::Internal(other.into()),
        }
    }
}

fn require_bearer(headers: &HeaderMap) -> ApiResult<&str> {
    bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing or invalid Authorization header".to_string()))
}

/// Public contact form: validate, then upsert by email
pub async fn submit_contact(
    State(state): State<Arc<ContactState>>,
    body: Bytes,
) -> ApiResult<Json<ContactResponse>> {
    let form: ContactForm = parse_json(&body)?;
    let properties = form.into_properties()?;

    let contact_id = state.crm.upsert_contact(&properties).await?;
    info!(contact_id = %contact_id, "Contact form submitted");

    Ok(Json(ContactResponse {
        success: true,
        message: "Contact saved successfully".to_string(),
        contact_id,
    }))
}

pub async fn authorize(
    State(state): State<Arc<ContactState>>,
    Query(query): Query<AuthorizeQuery>,
) -> ApiResult<Response> {
    let url = state.crm.authorize_url(query.state.as_deref())?;
    let location = HeaderValue::from_str(&url).map_err(|e| ApiError::Internal(e.into()))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

pub async fn exchange_token(
    State(state): State<Arc<ContactState>>,
    body: Bytes,
) -> ApiResult<Json<TokenGrant>> {
    let request: TokenRequest = parse_json(&body)?;
    let code = non_empty(request.code)
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;

    Ok(Json(state.crm.exchange_code(&code).await?))
}

pub async fn list_remote_contacts(
    State(state): State<Arc<ContactState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> ApiResult<Json<Value>> {
    let token = require_bearer(&headers)?;
    Ok(Json(state.crm.list_contacts(token, query.as_deref()).await?))
}

pub async fn create_remote_contact(
    State(state): State<Arc<ContactState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let token = require_bearer(&headers)?;
    let body: Value = parse_json(&body)?;
    let created = state.crm.create_contact(token, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_remote_contact(
    State(state): State<Arc<ContactState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let token = require_bearer(&headers)?;
    if !is_contact_id(&id) {
        return Err(ApiError::BadRequest("Invalid contact id".to_string()));
    }
    let body: Value = parse_json(&body)?;
    Ok(Json(state.crm.update_contact(token, &id, &body).await?))
}

/// CRM object ids are numeric
fn is_contact_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 20 && id.bytes().all(|b| b.is_ascii_digit())
}

pub async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .entry(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(HeaderValue::from_static("*"));
    response
}

/// Plain `OPTIONS` answer for every proxy endpoint
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                "GET, POST, PATCH, OPTIONS",
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "authorization, content-type",
            ),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
