use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub site_server: ServerConfig,
    pub api_server: ServerConfig,
    pub auth: AuthConfig,
    pub crm: CrmConfig,
    pub tracking: TrackingConfig,
    pub frontend: FrontendConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Oauth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub issuer_url: String,
    pub audience: String,
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default = "OAuthConfig::default_cache_ttl_secs")]
    pub jwks_cache_ttl_secs: u64,
}

impl OAuthConfig {
    const fn default_cache_ttl_secs() -> u64 {
        300
    }
}

/// Hosted email/password identity service (GoTrue-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Upstream contact-management API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    pub api_base_url: String,
    pub auth_url: String,
    pub token_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    /// Server-held token used by the public contact form.
    #[serde(default)]
    pub private_app_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    None,
    Standard,
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub enabled: bool,
    /// Extra hostnames that never produce analytics rows
    pub ignored_hosts: Vec<String>,
    pub geoip_city_db_path: Option<String>,
    pub ip_anonymization: bool,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// CIDR ranges of proxies allowed to set forwarding headers
    pub trusted_proxies: Vec<String>,
    pub num_trusted_proxies: Option<usize>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignored_hosts: Vec::new(),
            geoip_city_db_path: None,
            ip_anonymization: false,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Path to directory containing the marketing pages
    /// If None, uses the embedded pages
    pub static_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub cursor_hmac_secret: Option<String>,
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./repdesk.db?mode=rwc".to_string());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let site_host = std::env::var("SITE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let site_port = std::env::var("SITE_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("SITE_PORT must be a valid port number")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let auth_mode = match std::env::var("AUTH_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => AuthMode::None,
            "oauth" => AuthMode::Oauth,
            other => {
                tracing::warn!(
                    "Unknown AUTH_MODE '{other}', falling back to 'none'. Supported values: none, oauth"
                );
                AuthMode::None
            }
        };

        let oauth = if matches!(auth_mode, AuthMode::Oauth) {
            let issuer_url = std::env::var("OAUTH_ISSUER_URL")
                .context("OAUTH_ISSUER_URL must be set when AUTH_MODE=oauth")?;
            let audience = std::env::var("OAUTH_AUDIENCE")
                .context("OAUTH_AUDIENCE must be set when AUTH_MODE=oauth")?;
            let jwks_url = std::env::var("OAUTH_JWKS_URL").ok();
            let jwks_cache_ttl_secs = std::env::var("OAUTH_JWKS_CACHE_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or_else(OAuthConfig::default_cache_ttl_secs);

            Some(OAuthConfig {
                issuer_url,
                audience,
                jwks_url,
                jwks_cache_ttl_secs,
            })
        } else {
            None
        };

        let identity = match (
            std::env::var("IDENTITY_URL").ok(),
            std::env::var("IDENTITY_API_KEY").ok(),
        ) {
            (Some(base_url), Some(api_key)) => Some(IdentityConfig { base_url, api_key }),
            (Some(_), None) => {
                tracing::warn!("IDENTITY_URL is set without IDENTITY_API_KEY; sign-in disabled");
                None
            }
            _ => None,
        };

        let mut scopes = env_list("CRM_SCOPES");
        if scopes.is_empty() {
            scopes = vec![
                "crm.objects.contacts.read".to_string(),
                "crm.objects.contacts.write".to_string(),
            ];
        }

        let crm = CrmConfig {
            api_base_url: std::env::var("CRM_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.hubapi.com".to_string()),
            auth_url: std::env::var("CRM_AUTH_URL")
                .unwrap_or_else(|_| "https://app.hubspot.com/oauth/authorize".to_string()),
            token_url: std::env::var("CRM_TOKEN_URL")
                .unwrap_or_else(|_| "https://api.hubapi.com/oauth/v1/token".to_string()),
            client_id: std::env::var("CRM_CLIENT_ID").ok(),
            client_secret: std::env::var("CRM_CLIENT_SECRET").ok(),
            redirect_uri: std::env::var("CRM_REDIRECT_URI").ok(),
            scopes,
            private_app_token: std::env::var("CRM_PRIVATE_APP_TOKEN").ok(),
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let tracking = TrackingConfig {
            enabled: env_flag("TRACKING_ENABLED", true),
            ignored_hosts: env_list("TRACKING_IGNORED_HOSTS"),
            geoip_city_db_path: std::env::var("GEOIP_CITY_DB_PATH").ok(),
            ip_anonymization: env_flag("IP_ANONYMIZATION", false),
            trusted_proxy_mode,
            trusted_proxies: env_list("TRUSTED_PROXIES"),
            num_trusted_proxies: std::env::var("NUM_TRUSTED_PROXIES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok()),
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            site_server: ServerConfig {
                host: site_host,
                port: site_port,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            auth: AuthConfig {
                mode: auth_mode,
                oauth,
                identity,
            },
            crm,
            tracking,
            frontend: FrontendConfig {
                static_dir: std::env::var("FRONTEND_STATIC_DIR").ok(),
            },
            pagination: PaginationConfig {
                cursor_hmac_secret: std::env::var("CURSOR_HMAC_SECRET").ok(),
            },
        })
    }
}
