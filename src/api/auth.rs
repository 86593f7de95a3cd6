//! Dashboard sign-in and sign-up

use axum::{body::Bytes, extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::AppState;
use crate::auth::identity::IdentityUser;
use crate::auth::Principal;
use crate::error::{parse_json, ApiError, ApiResult};
use crate::models::is_valid_email;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    fn validated(self) -> ApiResult<Self> {
        let email = self.email.trim().to_lowercase();
        if !is_valid_email(&email) || self.password.is_empty() {
            return Err(ApiError::BadRequest(
                "Email and password are required".to_string(),
            ));
        }
        Ok(Self {
            email,
            password: self.password,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: IdentityUser,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub success: bool,
    pub message: String,
    pub user: IdentityUser,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub email: Option<String>,
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<SignInResponse>> {
    let credentials = parse_json::<Credentials>(&body)?.validated()?;
    let signed_in = state
        .auth
        .sign_in(&credentials.email, &credentials.password)
        .await?;

    Ok(Json(SignInResponse {
        success: true,
        access_token: signed_in.tokens.access_token,
        refresh_token: signed_in.tokens.refresh_token,
        expires_in: signed_in.tokens.expires_in,
        user: signed_in.user,
    }))
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SignUpResponse>)> {
    let credentials = parse_json::<Credentials>(&body)?.validated()?;
    let user = state
        .auth
        .sign_up(&credentials.email, &credentials.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            success: true,
            message: "Account created. An administrator must grant dashboard access.".to_string(),
            user,
        }),
    ))
}

pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: principal.user_id,
        email: principal.email,
    })
}
