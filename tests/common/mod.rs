#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use repdesk::analytics::models::{
    AnalyticsEvent, NewEvent, NewPageView, NewSession, PageView, Session, TouchedSession,
};
use repdesk::analytics::{EventRecorder, ProxyTrust};
use repdesk::api::create_api_router;
use repdesk::auth::identity::{
    IdentityError, IdentityProvider, IdentityUser, SessionTokens, SignedIn,
};
use repdesk::auth::AuthService;
use repdesk::config::{AuthMode, TrackingConfig};
use repdesk::contact::{ContactProperties, ContactState, CrmClient, CrmError, TokenGrant};
use repdesk::cursor::{CursorData, CursorSigner};
use repdesk::models::{Account, AccountInput, Contact, ContactInput, ListFilter, UserRole};
use repdesk::site::{create_site_router, SiteState};
use repdesk::storage::{SqliteStorage, Storage, StorageResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tower::ServiceExt;

pub async fn create_test_storage() -> Arc<dyn Storage> {
    // one connection: every in-memory connection is a separate database
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Delegates to another storage, but holds every `page_views_since` call
/// until the test calls `release`.
pub struct GatedStorage {
    inner: Arc<dyn Storage>,
    gate: Semaphore,
    waiting: AtomicUsize,
}

impl GatedStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Yield until `count` summary loads are parked on the gate.
    pub async fn wait_for_loads(&self, count: usize) {
        while self.waiting.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }
}

#[async_trait]
impl Storage for GatedStorage {
    async fn init(&self) -> anyhow::Result<()> {
        self.inner.init().await
    }

    async fn insert_session(&self, session: &NewSession) -> anyhow::Result<()> {
        self.inner.insert_session(session).await
    }

    async fn touch_session(
        &self,
        session_id: &str,
        at: i64,
    ) -> anyhow::Result<Option<TouchedSession>> {
        self.inner.touch_session(session_id, at).await
    }

    async fn insert_page_view(&self, view: &NewPageView) -> anyhow::Result<()> {
        self.inner.insert_page_view(view).await
    }

    async fn insert_event(&self, event: &NewEvent) -> anyhow::Result<()> {
        self.inner.insert_event(event).await
    }

    async fn page_views_since(&self, since: i64) -> anyhow::Result<Vec<PageView>> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await?;
        self.inner.page_views_since(since).await
    }

    async fn sessions_since(&self, since: i64) -> anyhow::Result<Vec<Session>> {
        self.inner.sessions_since(since).await
    }

    async fn events_since(&self, since: i64) -> anyhow::Result<Vec<AnalyticsEvent>> {
        self.inner.events_since(since).await
    }

    async fn role_for(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        self.inner.role_for(user_id).await
    }

    async fn grant_role(
        &self,
        user_id: &str,
        email: Option<&str>,
        role: &str,
    ) -> anyhow::Result<()> {
        self.inner.grant_role(user_id, email, role).await
    }

    async fn revoke_role(&self, user_id: &str) -> anyhow::Result<bool> {
        self.inner.revoke_role(user_id).await
    }

    async fn list_roles(&self) -> anyhow::Result<Vec<UserRole>> {
        self.inner.list_roles().await
    }

    async fn create_contact(&self, input: &ContactInput) -> StorageResult<Contact> {
        self.inner.create_contact(input).await
    }

    async fn get_contact(&self, id: i64) -> anyhow::Result<Option<Contact>> {
        self.inner.get_contact(id).await
    }

    async fn update_contact(&self, id: i64, input: &ContactInput) -> StorageResult<Contact> {
        self.inner.update_contact(id, input).await
    }

    async fn delete_contact(&self, id: i64) -> anyhow::Result<bool> {
        self.inner.delete_contact(id).await
    }

    async fn list_contacts(
        &self,
        filter: &ListFilter,
        after: Option<&CursorData>,
        limit: i64,
    ) -> anyhow::Result<Vec<Contact>> {
        self.inner.list_contacts(filter, after, limit).await
    }

    async fn create_account(&self, input: &AccountInput) -> StorageResult<Account> {
        self.inner.create_account(input).await
    }

    async fn get_account(&self, id: i64) -> anyhow::Result<Option<Account>> {
        self.inner.get_account(id).await
    }

    async fn update_account(&self, id: i64, input: &AccountInput) -> StorageResult<Account> {
        self.inner.update_account(id, input).await
    }

    async fn delete_account(&self, id: i64) -> anyhow::Result<bool> {
        self.inner.delete_account(id).await
    }

    async fn list_accounts(
        &self,
        filter: &ListFilter,
        after: Option<&CursorData>,
        limit: i64,
    ) -> anyhow::Result<Vec<Account>> {
        self.inner.list_accounts(filter, after, limit).await
    }
}

/// Records every call; upserts answer with contact id "101".
#[derive(Default)]
pub struct FakeCrm {
    pub upserts: Mutex<Vec<ContactProperties>>,
    pub bearers: Mutex<Vec<String>>,
    pub panic_on_list: bool,
}

impl FakeCrm {
    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }
}

#[async_trait]
impl CrmClient for FakeCrm {
    async fn upsert_contact(&self, properties: &ContactProperties) -> Result<String, CrmError> {
        self.upserts.lock().unwrap().push(properties.clone());
        Ok("101".to_string())
    }

    fn authorize_url(&self, state: Option<&str>) -> Result<String, CrmError> {
        Ok(format!(
            "https://app.crm.example/oauth/authorize?client_id=abc&state={}",
            state.unwrap_or_default()
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, CrmError> {
        if code != "good-code" {
            return Err(CrmError::Upstream {
                status: 400,
                message: "invalid code".to_string(),
            });
        }
        Ok(TokenGrant {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_in: Some(1800),
        })
    }

    async fn list_contacts(&self, bearer: &str, query: Option<&str>) -> Result<Value, CrmError> {
        if self.panic_on_list {
            panic!("upstream client bug");
        }
        self.bearers.lock().unwrap().push(bearer.to_string());
        Ok(json!({ "results": [], "query": query }))
    }

    async fn create_contact(&self, bearer: &str, body: &Value) -> Result<Value, CrmError> {
        self.bearers.lock().unwrap().push(bearer.to_string());
        Ok(json!({ "id": "202", "properties": body["properties"] }))
    }

    async fn update_contact(&self, bearer: &str, id: &str, body: &Value) -> Result<Value, CrmError> {
        self.bearers.lock().unwrap().push(bearer.to_string());
        Ok(json!({ "id": id, "properties": body["properties"] }))
    }
}

/// Accepts `<anything>@repdesk.example` with password "correct-horse";
/// the user id is the local part.
pub struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, IdentityError> {
        let Some(local) = email.strip_suffix("@repdesk.example") else {
            return Err(IdentityError::InvalidCredentials);
        };
        if password != "correct-horse" {
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(SignedIn {
            user: IdentityUser {
                id: local.to_string(),
                email: Some(email.to_string()),
            },
            tokens: SessionTokens {
                access_token: format!("token-for-{local}"),
                refresh_token: Some("refresh".to_string()),
                expires_in: Some(3600),
                token_type: Some("bearer".to_string()),
            },
        })
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<IdentityUser, IdentityError> {
        if email == "taken@repdesk.example" {
            return Err(IdentityError::Rejected("User already registered".to_string()));
        }
        Ok(IdentityUser {
            id: "new-user".to_string(),
            email: Some(email.to_string()),
        })
    }
}

pub fn site_router(storage: Arc<dyn Storage>, crm: Arc<FakeCrm>) -> Router {
    let tracking = TrackingConfig::default();
    let site = Arc::new(SiteState {
        recorder: EventRecorder::new(storage, &tracking, None),
        proxy: ProxyTrust::from_config(&tracking),
        static_dir: None,
    });
    create_site_router(site, Arc::new(ContactState { crm }))
}

pub fn api_router(storage: Arc<dyn Storage>, mode: AuthMode) -> Router {
    let auth = AuthService::new(mode, Arc::clone(&storage)).with_identity(Arc::new(FakeIdentity));
    create_api_router(
        storage,
        Arc::new(auth),
        CursorSigner::new(Some("integration-test-secret")),
    )
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
