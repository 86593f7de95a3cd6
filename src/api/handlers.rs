use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::SummaryLoader;
use crate::auth::AuthService;
use crate::cursor::{CursorData, CursorSigner};
use crate::error::{parse_json, ApiError, ApiResult};
use crate::models::{
    non_empty, Account, AccountInput, Contact, ContactInput, ListFilter, ACCOUNT_STATUSES,
    CONTACT_STATUSES,
};
use crate::storage::{Storage, StorageError};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub cursor: CursorSigner,
    pub auth: Arc<AuthService>,
    pub loader: SummaryLoader,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Rows that can be paged by `(created_at, id)`
trait Paged {
    fn position(&self) -> CursorData;
}

impl Paged for Contact {
    fn position(&self) -> CursorData {
        CursorData {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

impl Paged for Account {
    fn position(&self) -> CursorData {
        CursorData {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

struct PageRequest {
    filter: ListFilter,
    after: Option<CursorData>,
    limit: i64,
}

impl ListQuery {
    fn into_request(self, signer: &CursorSigner, statuses: &[&str]) -> ApiResult<PageRequest> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let status = non_empty(self.status).map(|s| s.to_lowercase());
        if let Some(status) = &status {
            if !statuses.contains(&status.as_str()) {
                return Err(ApiError::BadRequest(format!("Unknown status '{status}'")));
            }
        }

        let after = non_empty(self.cursor)
            .map(|c| signer.verify(&c))
            .transpose()
            .map_err(|_| ApiError::BadRequest("Invalid cursor".to_string()))?;

        Ok(PageRequest {
            filter: ListFilter {
                search: non_empty(self.search),
                status,
            },
            after,
            limit,
        })
    }
}

/// `rows` were fetched with `limit + 1`; the extra row only signals another page.
fn into_page<T: Paged>(mut rows: Vec<T>, limit: i64, signer: &CursorSigner) -> ApiResult<Page<T>> {
    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);

    let next_cursor = match rows.last() {
        Some(last) if has_more => Some(signer.sign(&last.position())?),
        _ => None,
    };
    Ok(Page {
        items: rows,
        next_cursor,
    })
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// Contacts --------------------------------------------------------------

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Contact>>> {
    let request = query.into_request(&state.cursor, CONTACT_STATUSES)?;
    let rows = state
        .storage
        .list_contacts(&request.filter, request.after.as_ref(), request.limit + 1)
        .await?;
    Ok(Json(into_page(rows, request.limit, &state.cursor)?))
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    let input: ContactInput = parse_json(&body)?;
    let input = input.normalized().map_err(ApiError::BadRequest)?;
    let contact = state.storage.create_contact(&input).await.map_err(duplicate_email)?;
    tracing::info!(contact_id = contact.id, "Created contact");
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Contact>> {
    state
        .storage
        .get_contact(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Contact {id} not found")))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Json<Contact>> {
    let input: ContactInput = parse_json(&body)?;
    let input = input.normalized().map_err(ApiError::BadRequest)?;
    let contact = state
        .storage
        .update_contact(id, &input)
        .await
        .map_err(|e| match e {
            StorageError::NotFound => {
                ApiError::NotFound(format!("Contact {id} not found"))
            }
            other => duplicate_email(other),
        })?;
    Ok(Json(contact))
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse>> {
    if !state.storage.delete_contact(id).await? {
        return Err(ApiError::NotFound(format!("Contact {id} not found")));
    }
    Ok(Json(SuccessResponse {
        success: true,
        message: format!("Contact {id} deleted"),
    }))
}

fn duplicate_email(err: StorageError) -> ApiError {
    match err {
        StorageError::Conflict => {
            ApiError::Conflict("A contact with this email already exists".to_string())
        }
        other => other.into(),
    }
}

// Accounts --------------------------------------------------------------

pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Account>>> {
    let request = query.into_request(&state.cursor, ACCOUNT_STATUSES)?;
    let rows = state
        .storage
        .list_accounts(&request.filter, request.after.as_ref(), request.limit + 1)
        .await?;
    Ok(Json(into_page(rows, request.limit, &state.cursor)?))
}

pub async fn create_account(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let input: AccountInput = parse_json(&body)?;
    let input = input.normalized().map_err(ApiError::BadRequest)?;
    let account = state.storage.create_account(&input).await?;
    tracing::info!(account_id = account.id, "Created account");
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Account>> {
    state
        .storage
        .get_account(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Account {id} not found")))
}

pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Json<Account>> {
    let input: AccountInput = parse_json(&body)?;
    let input = input.normalized().map_err(ApiError::BadRequest)?;
    let account = state
        .storage
        .update_account(id, &input)
        .await
        .map_err(|e| match e {
            StorageError::NotFound => {
                ApiError::NotFound(format!("Account {id} not found"))
            }
            other => other.into(),
        })?;
    Ok(Json(account))
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse>> {
    if !state.storage.delete_account(id).await? {
        return Err(ApiError::NotFound(format!("Account {id} not found")));
    }
    Ok(Json(SuccessResponse {
        success: true,
        message: format!("Account {id} deleted"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CursorSigner {
        CursorSigner::new(Some("page-test-secret"))
    }

    fn query(limit: Option<i64>, status: Option<&str>, cursor: Option<&str>) -> ListQuery {
        ListQuery {
            search: Some("  ".to_string()),
            status: status.map(str::to_string),
            cursor: cursor.map(str::to_string),
            limit,
        }
    }

    #[test]
    fn page_request_validation() {
        let request = query(None, Some("Lead"), None)
            .into_request(&signer(), CONTACT_STATUSES)
            .unwrap();
        assert_eq!(request.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(request.filter.status.as_deref(), Some("lead"));
        assert!(request.filter.search.is_none());

        assert!(query(Some(0), None, None).into_request(&signer(), CONTACT_STATUSES).is_err());
        assert!(query(Some(101), None, None).into_request(&signer(), CONTACT_STATUSES).is_err());
        assert!(query(None, Some("active"), None)
            .into_request(&signer(), CONTACT_STATUSES)
            .is_err());
        assert!(query(None, None, Some("garbage"))
            .into_request(&signer(), CONTACT_STATUSES)
            .is_err());
    }

    #[test]
    fn next_cursor_only_when_more_rows() {
        let account = |id: i64| Account {
            id,
            name: format!("Account {id}"),
            industry: None,
            website: None,
            phone: None,
            status: "active".to_string(),
            annual_revenue: None,
            notes: None,
            created_at: 1_000 - id,
            updated_at: 1_000 - id,
        };

        let page = into_page(vec![account(3), account(2), account(1)], 2, &signer()).unwrap();
        assert_eq!(page.items.len(), 2);
        let cursor = page.next_cursor.expect("more rows");
        assert_eq!(
            signer().verify(&cursor).unwrap(),
            CursorData {
                created_at: 998,
                id: 2
            }
        );

        let last = into_page(vec![account(1)], 2, &signer()).unwrap();
        assert!(last.next_cursor.is_none());
    }
}
