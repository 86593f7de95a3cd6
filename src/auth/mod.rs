//! Dashboard gating
//!
//! Admin access is decided on the server: a principal is an admin only if
//! `user_roles` says so. Roles are granted with the `repdesk-admin` binary.

pub mod identity;
pub mod oauth;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::config::{AuthConfig, AuthMode};
use crate::error::{ApiError, ApiResult};
use crate::models::ADMIN_ROLE;
use crate::storage::Storage;
use identity::{IdentityError, IdentityProvider, SignedIn};
use oauth::OAuthValidator;

pub const ACCESS_DENIED: &str = "Access denied";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Authenticated dashboard user, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
}

impl Principal {
    /// Stand-in used when `AUTH_MODE=none`
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            email: None,
        }
    }
}

pub struct AuthService {
    mode: AuthMode,
    validator: Option<OAuthValidator>,
    identity: Option<Arc<dyn IdentityProvider>>,
    storage: Arc<dyn Storage>,
}

impl AuthService {
    pub fn new(mode: AuthMode, storage: Arc<dyn Storage>) -> Self {
        Self {
            mode,
            validator: None,
            identity: None,
            storage,
        }
    }

    pub fn with_validator(mut self, validator: OAuthValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub async fn from_config(config: &AuthConfig, storage: Arc<dyn Storage>) -> anyhow::Result<Self> {
        let mut service = Self::new(config.mode.clone(), storage);

        if let AuthMode::Oauth = config.mode {
            let oauth = config
                .oauth
                .as_ref()
                .context("AUTH_MODE=oauth requires OAUTH_ISSUER_URL")?;
            service = service.with_validator(OAuthValidator::from_config(oauth).await?);
            info!("Dashboard authentication: bearer tokens from {}", oauth.issuer_url);
        } else {
            warn!("Dashboard authentication disabled (AUTH_MODE=none)");
        }

        if let Some(identity) = &config.identity {
            service = service.with_identity(Arc::new(identity::HostedIdentity::new(identity)?));
        }

        Ok(service)
    }

    pub async fn is_admin(&self, user_id: &str) -> anyhow::Result<bool> {
        Ok(self.storage.role_for(user_id).await?.as_deref() == Some(ADMIN_ROLE))
    }

    /// Resolve the dashboard principal for a request, admins only.
    pub async fn authorize(&self, headers: &HeaderMap) -> ApiResult<Principal> {
        let AuthMode::Oauth = self.mode else {
            return Ok(Principal::anonymous());
        };

        let token = bearer_token(headers)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;
        let validator = self
            .validator
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("Authentication is not configured".to_string()))?;

        let principal = validator.validate(token).await.map_err(|e| {
            warn!("Rejected dashboard token: {e:#}");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        if !self.is_admin(&principal.user_id).await? {
            return Err(ApiError::Forbidden(ACCESS_DENIED.to_string()));
        }
        Ok(principal)
    }

    fn identity(&self) -> ApiResult<&Arc<dyn IdentityProvider>> {
        self.identity
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("Sign-in is not configured".to_string()))
    }

    /// Password sign-in. Tokens are only returned for admins.
    pub async fn sign_in(&self, email: &str, password: &str) -> ApiResult<SignedIn> {
        let signed_in = self
            .identity()?
            .sign_in(email, password)
            .await
            .map_err(identity_error)?;

        if !self.is_admin(&signed_in.user.id).await? {
            warn!(user_id = %signed_in.user.id, "Sign-in refused for non-admin account");
            return Err(ApiError::Forbidden(ACCESS_DENIED.to_string()));
        }

        info!(user_id = %signed_in.user.id, "Admin signed in");
        Ok(signed_in)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> ApiResult<identity::IdentityUser> {
        let user = self
            .identity()?
            .sign_up(email, password)
            .await
            .map_err(identity_error)?;
        info!(user_id = %user.id, "Account created; no dashboard role granted");
        Ok(user)
    }
}

fn identity_error(err: IdentityError) -> ApiError {
    match err {
        IdentityError::InvalidCredentials => ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()),
        IdentityError::Rejected(message) => ApiError::BadRequest(message),
        other => ApiError::Internal(other.into()),
    }
}

/// Token from an `Authorization: Bearer ...` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth.authorize(request.headers()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
