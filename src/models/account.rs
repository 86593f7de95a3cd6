use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ACCOUNT_STATUSES: &[&str] = &["active", "prospect", "inactive"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub annual_revenue: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInput {
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub annual_revenue: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AccountInput {
    pub fn normalized(mut self) -> Result<Self, String> {
        self.name = self.name.trim().to_string();
        self.industry = super::non_empty(self.industry);
        self.website = super::non_empty(self.website);
        self.phone = super::non_empty(self.phone);
        self.notes = super::non_empty(self.notes);

        if self.name.is_empty() {
            return Err("Account name is required".to_string());
        }
        if matches!(self.annual_revenue, Some(revenue) if revenue < 0) {
            return Err("Annual revenue cannot be negative".to_string());
        }
        if let Some(website) = &self.website {
            if url::Url::parse(website).is_err() {
                return Err("Website must be an absolute URL".to_string());
            }
        }

        let status = super::non_empty(self.status)
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "prospect".to_string());
        if !ACCOUNT_STATUSES.contains(&status.as_str()) {
            return Err(format!(
                "Unknown status '{status}', expected one of {}",
                ACCOUNT_STATUSES.join(", ")
            ));
        }
        self.status = Some(status);

        Ok(self)
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("prospect")
    }
}
