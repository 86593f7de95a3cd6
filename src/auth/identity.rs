//! Hosted email/password identity service
//!
//! The dashboard never checks passwords itself. Sign-in and sign-up are
//! forwarded to a GoTrue-compatible service; what the service returns is only
//! handed to the browser after the role check in `AuthService::sign_in`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::IdentityConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The service refused the request for a reason the user can fix
    #[error("{0}")]
    Rejected(String),
    #[error("identity service returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("identity service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: IdentityUser,
    pub tokens: SessionTokens,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, IdentityError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<IdentityUser, IdentityError>;
}

pub struct HostedIdentity {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct PasswordGrantResponse {
    #[serde(flatten)]
    tokens: SessionTokens,
    user: IdentityUser,
}

impl HostedIdentity {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("repdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<reqwest::Response, IdentityError> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?)
    }
}

/// Best human-readable message from a GoTrue error body
fn error_message(body: &Value) -> String {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait]
impl IdentityProvider for HostedIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, IdentityError> {
        let response = self
            .post(
                "/auth/v1/token?grant_type=password",
                json!({ "email": email, "password": password }),
            )
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(IdentityError::InvalidCredentials);
        }
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(IdentityError::Upstream {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let grant: PasswordGrantResponse = response.json().await?;
        Ok(SignedIn {
            user: grant.user,
            tokens: grant.tokens,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<IdentityUser, IdentityError> {
        let response = self
            .post("/auth/v1/signup", json!({ "email": email, "password": password }))
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_client_error() {
            return Err(IdentityError::Rejected(error_message(&body)));
        }
        if !status.is_success() {
            return Err(IdentityError::Upstream {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        // With auto-confirm the service returns a session wrapping the user.
        let user = body.get("user").cloned().unwrap_or(body);
        serde_json::from_value(user).map_err(|e| IdentityError::Upstream {
            status: status.as_u16(),
            message: format!("unexpected sign-up response: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_most_specific_error_message() {
        let body = json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" });
        assert_eq!(error_message(&body), "Invalid login credentials");
        assert_eq!(error_message(&json!({ "msg": "User already registered" })), "User already registered");
        assert_eq!(error_message(&Value::Null), "unknown error");
    }

    #[test]
    fn password_grant_response_parses() {
        let body = json!({
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "user": { "id": "u-1", "email": "ops@repdesk.example", "role": "authenticated" }
        });
        let grant: PasswordGrantResponse = serde_json::from_value(body).unwrap();
        assert_eq!(grant.user.id, "u-1");
        assert_eq!(grant.tokens.refresh_token.as_deref(), Some("rt"));
        assert_eq!(grant.tokens.expires_in, Some(3600));
    }
}
