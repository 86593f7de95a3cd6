//! Client for the upstream contact-management API (HubSpot CRM v3)

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::CrmConfig;

const CONTACTS_PATH: &[&str] = &["crm", "v3", "objects", "contacts"];

#[derive(Debug, Error)]
pub enum CrmError {
    /// Create refused because the email already exists
    #[error("contact already exists (existing id: {existing_id:?})")]
    Conflict { existing_id: Option<String> },
    #[error("CRM returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("CRM unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("CRM integration is not configured: {0} missing")]
    NotConfigured(&'static str),
}

/// Contact fields sent upstream; absent fields are left out of the payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProperties {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Create the contact, or update the existing one with the same email.
    /// Returns the upstream contact id.
    async fn upsert_contact(&self, properties: &ContactProperties) -> Result<String, CrmError>;

    fn authorize_url(&self, state: Option<&str>) -> Result<String, CrmError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, CrmError>;

    /// Calls made with the caller's own bearer token. `query` is forwarded as is.
    async fn list_contacts(&self, bearer: &str, query: Option<&str>) -> Result<Value, CrmError>;

    async fn create_contact(&self, bearer: &str, body: &Value) -> Result<Value, CrmError>;

    async fn update_contact(&self, bearer: &str, id: &str, body: &Value) -> Result<Value, CrmError>;
}

pub struct HubSpotClient {
    client: Client,
    config: CrmConfig,
}

impl HubSpotClient {
    pub fn new(config: CrmConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("repdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// The id is appended as one percent-encoded path segment.
    fn contacts_url(&self, id: Option<&str>) -> Result<Url, CrmError> {
        let invalid = || CrmError::NotConfigured("valid CRM_API_BASE_URL");
        let mut url = Url::parse(&self.config.api_base_url).map_err(|_| invalid())?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
            segments.pop_if_empty().extend(CONTACTS_PATH);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, bearer: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(bearer)
    }

    fn private_token(&self) -> Result<&str, CrmError> {
        self.config
            .private_app_token
            .as_deref()
            .ok_or(CrmError::NotConfigured("CRM_PRIVATE_APP_TOKEN"))
    }
}

/// Decode a JSON response, turning non-success statuses into `CrmError`.
async fn read_json(response: reqwest::Response) -> Result<Value, CrmError> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(body);
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string();

    if status == StatusCode::CONFLICT {
        return Err(CrmError::Conflict {
            existing_id: existing_id(&message),
        });
    }
    Err(CrmError::Upstream {
        status: status.as_u16(),
        message,
    })
}

/// Pull `N` out of "Contact already exists. Existing ID: N"
pub fn existing_id(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("Existing ID:")?;
    let id: String = rest
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    (!id.is_empty()).then_some(id)
}

fn object_id(body: &Value) -> Result<String, CrmError> {
    match body.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(CrmError::Upstream {
            status: 200,
            message: "response did not include a contact id".to_string(),
        }),
    }
}

#[async_trait]
impl CrmClient for HubSpotClient {
    async fn upsert_contact(&self, properties: &ContactProperties) -> Result<String, CrmError> {
        let token = self.private_token()?;
        let payload = json!({ "properties": properties });

        let created = self
            .request(Method::POST, self.contacts_url(None)?, token)
            .json(&payload)
            .send()
            .await?;

        match read_json(created).await {
            Ok(body) => {
                let id = object_id(&body)?;
                info!(contact_id = %id, "Created CRM contact");
                Ok(id)
            }
            Err(CrmError::Conflict {
                existing_id: Some(id),
            }) => {
                let updated = self
                    .request(Method::PATCH, self.contacts_url(Some(&id))?, token)
                    .json(&payload)
                    .send()
                    .await?;
                read_json(updated).await?;
                info!(contact_id = %id, "Updated existing CRM contact");
                Ok(id)
            }
            Err(e) => {
                warn!("CRM contact create failed: {e}");
                Err(e)
            }
        }
    }

    fn authorize_url(&self, state: Option<&str>) -> Result<String, CrmError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(CrmError::NotConfigured("CRM_CLIENT_ID"))?;
        let redirect_uri = self
            .config
            .redirect_uri
            .as_deref()
            .ok_or(CrmError::NotConfigured("CRM_REDIRECT_URI"))?;

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|_| CrmError::NotConfigured("valid CRM_AUTH_URL"))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", &self.config.scopes.join(" "));
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, CrmError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(CrmError::NotConfigured("CRM_CLIENT_ID"))?;
        let client_secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or(CrmError::NotConfigured("CRM_CLIENT_SECRET"))?;
        let redirect_uri = self
            .config
            .redirect_uri
            .as_deref()
            .ok_or(CrmError::NotConfigured("CRM_REDIRECT_URI"))?;

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .send()
            .await?;

        let body = read_json(response).await?;
        serde_json::from_value(body).map_err(|e| CrmError::Upstream {
            status: 200,
            message: format!("unexpected token response: {e}"),
        })
    }

    async fn list_contacts(&self, bearer: &str, query: Option<&str>) -> Result<Value, CrmError> {
        let mut url = self.contacts_url(None)?;
        url.set_query(query.filter(|q| !q.is_empty()));
        let response = self.request(Method::GET, url, bearer).send().await?;
        read_json(response).await
    }

    async fn create_contact(&self, bearer: &str, body: &Value) -> Result<Value, CrmError> {
        let response = self
            .request(Method::POST, self.contacts_url(None)?, bearer)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn update_contact(&self, bearer: &str, id: &str, body: &Value) -> Result<Value, CrmError> {
        let response = self
            .request(Method::PATCH, self.contacts_url(Some(id))?, bearer)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrmConfig {
        CrmConfig {
            api_base_url: "https://api.crm.example/".to_string(),
            auth_url: "https://app.crm.example/oauth/authorize".to_string(),
            token_url: "https://api.crm.example/oauth/v1/token".to_string(),
            client_id: Some("client-123".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_uri: Some("https://repdesk.example/oauth/callback".to_string()),
            scopes: vec![
                "crm.objects.contacts.read".to_string(),
                "crm.objects.contacts.write".to_string(),
            ],
            private_app_token: None,
        }
    }

    #[test]
    fn only_present_properties_are_serialized() {
        let properties = ContactProperties {
            email: "jane@x.com".to_string(),
            firstname: Some("Jane".to_string()),
            lastname: Some("Doe".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&properties).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(value["email"], "jane@x.com");
        assert!(value.get("company").is_none());
    }

    #[test]
    fn existing_id_is_parsed_from_conflict_message() {
        assert_eq!(
            existing_id("Contact already exists. Existing ID: 12345").as_deref(),
            Some("12345")
        );
        assert_eq!(existing_id("Existing ID:987 trailing").as_deref(), Some("987"));
        assert_eq!(existing_id("Contact already exists."), None);
        assert_eq!(existing_id("Existing ID: abc"), None);
    }

    #[test]
    fn authorize_url_carries_client_and_scopes() {
        let client = HubSpotClient::new(config()).unwrap();
        let url = Url::parse(&client.authorize_url(Some("xyz")).unwrap()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("app.crm.example"));
        assert!(pairs.contains(&("client_id".to_string(), "client-123".to_string())));
        assert!(pairs.contains(&(
            "scope".to_string(),
            "crm.objects.contacts.read crm.objects.contacts.write".to_string()
        )));
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
    }

    #[test]
    fn authorize_url_requires_client_id() {
        let client = HubSpotClient::new(CrmConfig {
            client_id: None,
            ..config()
        })
        .unwrap();
        assert!(matches!(
            client.authorize_url(None),
            Err(CrmError::NotConfigured("CRM_CLIENT_ID"))
        ));
    }

    #[test]
    fn contact_urls_trim_trailing_slash() {
        let client = HubSpotClient::new(config()).unwrap();
        assert_eq!(
            client.contacts_url(Some("42")).unwrap().as_str(),
            "https://api.crm.example/crm/v3/objects/contacts/42"
        );
        assert_eq!(
            client.contacts_url(None).unwrap().as_str(),
            "https://api.crm.example/crm/v3/objects/contacts"
        );
    }

    #[test]
    fn contact_id_stays_inside_the_contacts_path() {
        let client = HubSpotClient::new(config()).unwrap();
        let url = client.contacts_url(Some("../../../v1/owners")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.crm.example/crm/v3/objects/contacts/..%2F..%2F..%2Fv1%2Fowners"
        );
        assert_eq!(url.path_segments().unwrap().count(), 5);
    }
}
