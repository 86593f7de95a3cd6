use crate::analytics::models::{
    AnalyticsEvent, NewEvent, NewPageView, NewSession, PageView, Session, TouchedSession,
};
use crate::cursor::CursorData;
use crate::models::{Account, AccountInput, Contact, ContactInput, ListFilter, UserRole};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            sqlx::Error::RowNotFound => StorageError::NotFound,
            _ => StorageError::Other(err.into()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    // Analytics ---------------------------------------------------------

    async fn insert_session(&self, session: &NewSession) -> Result<()>;

    /// Record another page view in an existing session.
    /// Returns `None` when the session is unknown.
    async fn touch_session(&self, session_id: &str, at: i64) -> Result<Option<TouchedSession>>;

    async fn insert_page_view(&self, view: &NewPageView) -> Result<()>;

    async fn insert_event(&self, event: &NewEvent) -> Result<()>;

    /// Page views with `created_at >= since`, oldest first
    async fn page_views_since(&self, since: i64) -> Result<Vec<PageView>>;

    /// Sessions with `first_visit_at >= since`, oldest first
    async fn sessions_since(&self, since: i64) -> Result<Vec<Session>>;

    /// Events with `created_at >= since`, oldest first
    async fn events_since(&self, since: i64) -> Result<Vec<AnalyticsEvent>>;

    // Roles -------------------------------------------------------------

    async fn role_for(&self, user_id: &str) -> Result<Option<String>>;

    async fn grant_role(&self, user_id: &str, email: Option<&str>, role: &str) -> Result<()>;

    async fn revoke_role(&self, user_id: &str) -> Result<bool>;

    async fn list_roles(&self) -> Result<Vec<UserRole>>;

    // Contacts ----------------------------------------------------------

    async fn create_contact(&self, input: &ContactInput) -> StorageResult<Contact>;

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>>;

    async fn update_contact(&self, id: i64, input: &ContactInput) -> StorageResult<Contact>;

    async fn delete_contact(&self, id: i64) -> Result<bool>;

    /// Newest first; `after` continues from a previous page
    async fn list_contacts(
        &self,
        filter: &ListFilter,
        after: Option<&CursorData>,
        limit: i64,
    ) -> Result<Vec<Contact>>;

    // Accounts ----------------------------------------------------------

    async fn create_account(&self, input: &AccountInput) -> StorageResult<Account>;

    async fn get_account(&self, id: i64) -> Result<Option<Account>>;

    async fn update_account(&self, id: i64, input: &AccountInput) -> StorageResult<Account>;

    async fn delete_account(&self, id: i64) -> Result<bool>;

    async fn list_accounts(
        &self,
        filter: &ListFilter,
        after: Option<&CursorData>,
        limit: i64,
    ) -> Result<Vec<Account>>;
}

pub(crate) fn now_secs() -> Result<i64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64)
}

/// `%term%` for a case-insensitive LIKE, with LIKE wildcards escaped
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
