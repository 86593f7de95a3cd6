use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::Principal;
use crate::config::OAuthConfig;

/// Validates dashboard bearer tokens issued by the identity service
#[derive(Clone)]
pub struct OAuthValidator {
    issuer: String,
    audience: String,
    jwks_uri: String,
    client: Client,
    keys: Arc<RwLock<HashMap<String, Arc<DecodingKey>>>>,
    last_refresh: Arc<RwLock<Option<Instant>>>,
    cache_ttl: Duration,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    #[serde(default)]
    aud: Option<Value>,
    #[serde(default)]
    email: Option<String>,
}

impl OAuthValidator {
    pub async fn from_config(config: &OAuthConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("repdesk-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client for token validation")?;

        let jwks_uri = resolve_jwks_uri(config, &client).await?;
        let validator = Self {
            issuer: config.issuer_url.clone(),
            audience: config.audience.clone(),
            jwks_uri,
            client,
            keys: Arc::new(RwLock::new(HashMap::new())),
            last_refresh: Arc::new(RwLock::new(None)),
            cache_ttl: Duration::from_secs(config.jwks_cache_ttl_secs.max(60)),
        };

        validator.refresh_keys().await?;

        Ok(validator)
    }

    /// Verify signature, issuer and audience; return who the token belongs to.
    pub async fn validate(&self, token: &str) -> Result<Principal> {
        let header = decode_header(token).context("failed to parse token header")?;
        if header.alg == Algorithm::None {
            bail!("unsigned tokens are not allowed");
        }

        let kid = header
            .kid
            .ok_or_else(|| anyhow!("token header missing 'kid'"))?;
        let key = self.get_decoding_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, key.as_ref(), &validation)
            .context("token failed signature or structural validation")?
            .claims;

        if claims.iss.trim_end_matches('/') != self.issuer.trim_end_matches('/') {
            bail!("token issuer '{}' does not match expected issuer", claims.iss);
        }
        if !self.audience.is_empty() && !audience_matches(claims.aud.as_ref(), &self.audience) {
            bail!("token audience does not include expected value");
        }

        Ok(Principal {
            user_id: claims.sub,
            email: claims.email,
        })
    }

    async fn get_decoding_key(&self, kid: &str) -> Result<Arc<DecodingKey>> {
        let stale = {
            let last = self.last_refresh.read().await;
            last.is_none_or(|at| at.elapsed() > self.cache_ttl)
        };
        let missing = !self.keys.read().await.contains_key(kid);

        if stale || missing {
            debug!(kid, stale, "refreshing JWKS cache");
            self.refresh_keys().await?;
        }

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| anyhow!("no JWKS entry found for key id '{kid}'"))
    }

    async fn refresh_keys(&self) -> Result<()> {
        let jwks: JwkSet = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .context("failed to request JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error status")?
            .json()
            .await
            .context("failed to parse JWKS response")?;

        let mut new_keys = HashMap::new();
        for jwk in jwks.keys {
            let Some(kid) = jwk.kid else {
                warn!("Skipping JWKS entry without 'kid'");
                continue;
            };

            let key = match jwk.kty.as_str() {
                "RSA" => {
                    let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                        warn!("Skipping RSA key {kid} without modulus or exponent");
                        continue;
                    };
                    DecodingKey::from_rsa_components(n, e)
                        .context("failed to build RSA decoding key from JWKS entry")?
                }
                "oct" => {
                    let Some(secret) = jwk.k.as_deref() else {
                        warn!("Skipping symmetric key {kid} without 'k'");
                        continue;
                    };
                    DecodingKey::from_base64_secret(secret)
                        .context("failed to build HMAC decoding key from JWKS entry")?
                }
                other => {
                    warn!("Skipping unsupported JWKS key type: {other}");
                    continue;
                }
            };
            new_keys.insert(kid, Arc::new(key));
        }

        if new_keys.is_empty() {
            bail!("JWKS response did not contain any usable keys");
        }

        *self.keys.write().await = new_keys;
        *self.last_refresh.write().await = Some(Instant::now());

        Ok(())
    }
}

fn audience_matches(aud_claim: Option<&Value>, expected: &str) -> bool {
    match aud_claim {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(Value::as_str)
            .any(|entry| entry == expected),
        _ => false,
    }
}

async fn resolve_jwks_uri(config: &OAuthConfig, client: &Client) -> Result<String> {
    if let Some(url) = &config.jwks_url {
        return Ok(url.clone());
    }

    let issuer = config.issuer_url.trim_end_matches('/');
    let discovery_url = format!("{issuer}/.well-known/openid-configuration");
    let metadata: ProviderMetadata = client
        .get(&discovery_url)
        .send()
        .await
        .context("failed to request OpenID provider metadata")?
        .error_for_status()
        .context("OpenID provider metadata endpoint returned an error status")?
        .json()
        .await
        .context("failed to parse OpenID provider metadata")?;

    metadata
        .jwks_uri
        .ok_or_else(|| anyhow!("OpenID provider metadata did not include 'jwks_uri'"))
}

#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    jwks_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    #[serde(default)]
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    k: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_matching_handles_strings_and_arrays() {
        assert!(audience_matches(Some(&Value::String("abc".into())), "abc"));
        assert!(!audience_matches(Some(&Value::String("abc".into())), "def"));

        let array = Value::Array(vec![
            Value::String("authenticated".into()),
            Value::String("repdesk".into()),
        ]);
        assert!(audience_matches(Some(&array), "repdesk"));
        assert!(!audience_matches(Some(&array), "abc"));

        assert!(!audience_matches(None, "abc"));
    }

    #[test]
    fn claims_accept_missing_optional_fields() {
        let claims: Claims =
            serde_json::from_str(r#"{"sub":"u-1","iss":"https://id.example","exp":1}"#).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert!(claims.email.is_none());
        assert!(claims.aud.is_none());
    }
}
