use crate::analytics::models::{
    AnalyticsEvent, NewEvent, NewPageView, NewSession, PageView, Session, TouchedSession,
};
use crate::cursor::CursorData;
use crate::models::{Account, AccountInput, Contact, ContactInput, ListFilter, UserRole};
use crate::storage::trait_def::{like_pattern, now_secs};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;

const CONTACT_COLUMNS: &str = "id, first_name, last_name, email, phone, company, title, status, notes, created_at, updated_at";
const ACCOUNT_COLUMNS: &str = "id, name, industry, website, phone, status, annual_revenue, notes, created_at, updated_at";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn push_cursor(qb: &mut QueryBuilder<'_, Sqlite>, after: Option<&CursorData>) {
        if let Some(cursor) = after {
            qb.push(" AND (created_at < ")
                .push_bind(cursor.created_at)
                .push(" OR (created_at = ")
                .push_bind(cursor.created_at)
                .push(" AND id < ")
                .push_bind(cursor.id)
                .push("))");
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics_sessions (
                session_id TEXT PRIMARY KEY,
                first_visit_at INTEGER NOT NULL,
                last_activity_at INTEGER NOT NULL,
                device_type TEXT,
                browser TEXT,
                referrer TEXT,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                bounce INTEGER NOT NULL DEFAULT 1,
                page_views_count INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_first_visit ON analytics_sessions(first_visit_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics_page_views (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                page_path TEXT NOT NULL,
                page_title TEXT,
                referrer TEXT,
                user_agent TEXT,
                device_type TEXT,
                browser TEXT,
                operating_system TEXT,
                country TEXT,
                city TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_page_views_created_at ON analytics_page_views(created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                page_path TEXT NOT NULL,
                event_data TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_created_at ON analytics_events(created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT PRIMARY KEY,
                email TEXT,
                role TEXT NOT NULL,
                granted_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                phone TEXT,
                company TEXT,
                title TEXT,
                status TEXT NOT NULL DEFAULT 'lead',
                notes TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_created_at ON contacts(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                industry TEXT,
                website TEXT,
                phone TEXT,
                status TEXT NOT NULL DEFAULT 'prospect',
                annual_revenue INTEGER,
                notes TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_created_at ON accounts(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn insert_session(&self, session: &NewSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analytics_sessions
                (session_id, first_visit_at, last_activity_at, device_type, browser, referrer,
                 duration_seconds, bounce, page_views_count)
            VALUES (?, ?, ?, ?, ?, ?, 0, 1, 1)
            ON CONFLICT(session_id) DO NOTHING
            "#,
        )
        .bind(&session.session_id)
        .bind(session.started_at)
        .bind(session.started_at)
        .bind(&session.device_type)
        .bind(&session.browser)
        .bind(&session.referrer)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn touch_session(&self, session_id: &str, at: i64) -> Result<Option<TouchedSession>> {
        let referrer = sqlx::query_scalar::<_, Option<String>>(
            r#"
            UPDATE analytics_sessions
            SET last_activity_at = MAX(last_activity_at, ?),
                duration_seconds = MAX(last_activity_at, ?) - first_visit_at,
                page_views_count = page_views_count + 1,
                bounce = 0
            WHERE session_id = ?
            RETURNING referrer
            "#,
        )
        .bind(at)
        .bind(at)
        .bind(session_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(referrer.map(|referrer| TouchedSession { referrer }))
    }

    async fn insert_page_view(&self, view: &NewPageView) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analytics_page_views
                (session_id, page_path, page_title, referrer, user_agent, device_type,
                 browser, operating_system, country, city, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&view.session_id)
        .bind(&view.page_path)
        .bind(&view.page_title)
        .bind(&view.referrer)
        .bind(&view.user_agent)
        .bind(&view.device_type)
        .bind(&view.browser)
        .bind(&view.operating_system)
        .bind(&view.country)
        .bind(&view.city)
        .bind(view.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analytics_events (session_id, event_type, page_path, event_data, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.session_id)
        .bind(&event.event_type)
        .bind(&event.page_path)
        .bind(Json(&event.event_data))
        .bind(event.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn page_views_since(&self, since: i64) -> Result<Vec<PageView>> {
        let rows = sqlx::query_as::<_, PageView>(
            r#"
            SELECT id, session_id, page_path, page_title, referrer, user_agent, device_type,
                   browser, operating_system, country, city, created_at
            FROM analytics_page_views
            WHERE created_at >= ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(since)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn sessions_since(&self, since: i64) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, Session>(
            r#"
            SELECT session_id, first_visit_at, last_activity_at, device_type, browser, referrer,
                   duration_seconds, bounce, page_views_count
            FROM analytics_sessions
            WHERE first_visit_at >= ?
            ORDER BY first_visit_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn events_since(&self, since: i64) -> Result<Vec<AnalyticsEvent>> {
        let rows = sqlx::query_as::<_, AnalyticsEvent>(
            r#"
            SELECT id, session_id, event_type, page_path, event_data, created_at
            FROM analytics_events
            WHERE created_at >= ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(since)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn role_for(&self, user_id: &str) -> Result<Option<String>> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(role)
    }

    async fn grant_role(&self, user_id: &str, email: Option<&str>, role: &str) -> Result<()> {
        let now = now_secs()?;

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, email, role, granted_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                email = COALESCE(excluded.email, user_roles.email),
                role = excluded.role,
                granted_at = excluded.granted_at
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(role)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn revoke_role(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_roles(&self) -> Result<Vec<UserRole>> {
        let roles = sqlx::query_as::<_, UserRole>(
            "SELECT user_id, email, role, granted_at FROM user_roles ORDER BY granted_at DESC",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(roles)
    }

    async fn create_contact(&self, input: &ContactInput) -> StorageResult<Contact> {
        let now = now_secs()?;

        let result = sqlx::query(
            r#"
            INSERT INTO contacts
                (first_name, last_name, email, phone, company, title, status, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.title)
        .bind(input.status())
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        self.get_contact(result.last_insert_rowid())
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(contact)
    }

    async fn update_contact(&self, id: i64, input: &ContactInput) -> StorageResult<Contact> {
        let now = now_secs()?;

        let result = sqlx::query(
            r#"
            UPDATE contacts
            SET first_name = ?, last_name = ?, email = ?, phone = ?, company = ?,
                title = ?, status = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.title)
        .bind(input.status())
        .bind(&input.notes)
        .bind(now)
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        self.get_contact(id).await?.ok_or(StorageError::NotFound)
    }

    async fn delete_contact(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_contacts(
        &self,
        filter: &ListFilter,
        after: Option<&CursorData>,
        limit: i64,
    ) -> Result<Vec<Contact>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE 1 = 1"
        ));

        if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(term);
            qb.push(" AND (LOWER(first_name || ' ' || last_name) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(email) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(COALESCE(company, '')) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status.to_lowercase());
        }
        Self::push_cursor(&mut qb, after);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit);

        let contacts = qb
            .build_query_as::<Contact>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(contacts)
    }

    async fn create_account(&self, input: &AccountInput) -> StorageResult<Account> {
        let now = now_secs()?;

        let result = sqlx::query(
            r#"
            INSERT INTO accounts
                (name, industry, website, phone, status, annual_revenue, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.name)
        .bind(&input.industry)
        .bind(&input.website)
        .bind(&input.phone)
        .bind(input.status())
        .bind(input.annual_revenue)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        self.get_account(result.last_insert_rowid())
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(account)
    }

    async fn update_account(&self, id: i64, input: &AccountInput) -> StorageResult<Account> {
        let now = now_secs()?;

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET name = ?, industry = ?, website = ?, phone = ?, status = ?,
                annual_revenue = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.name)
        .bind(&input.industry)
        .bind(&input.website)
        .bind(&input.phone)
        .bind(input.status())
        .bind(input.annual_revenue)
        .bind(&input.notes)
        .bind(now)
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        self.get_account(id).await?.ok_or(StorageError::NotFound)
    }

    async fn delete_account(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_accounts(
        &self,
        filter: &ListFilter,
        after: Option<&CursorData>,
        limit: i64,
    ) -> Result<Vec<Account>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE 1 = 1"
        ));

        if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(term);
            qb.push(" AND (LOWER(name) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(COALESCE(industry, '')) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status.to_lowercase());
        }
        Self::push_cursor(&mut qb, after);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit);

        let accounts = qb
            .build_query_as::<Account>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(accounts)
    }
}
