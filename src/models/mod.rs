mod account;
mod contact;

pub use account::{Account, AccountInput, ACCOUNT_STATUSES};
pub use contact::{Contact, ContactInput, CONTACT_STATUSES};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ADMIN_ROLE: &str = "admin";

/// Role assignment keyed by the identity provider's user id
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRole {
    pub user_id: String,
    pub email: Option<String>,
    pub role: String,
    pub granted_at: i64,
}

/// Filters shared by the CRM list endpoints
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive substring match
    pub search: Option<String>,
    pub status: Option<String>,
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Shape check for `local@domain.tld`: one `@`, no whitespace, and a dot
/// inside the domain with characters on both sides.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
