use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const CONTACT_STATUSES: &[&str] = &["lead", "prospect", "customer", "inactive"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContactInput {
    /// Trim fields, lowercase the email and default the status to "lead".
    pub fn normalized(mut self) -> Result<Self, String> {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self.phone = super::non_empty(self.phone);
        self.company = super::non_empty(self.company);
        self.title = super::non_empty(self.title);
        self.notes = super::non_empty(self.notes);

        if self.first_name.is_empty() || self.last_name.is_empty() {
            return Err("First and last name are required".to_string());
        }
        if !super::is_valid_email(&self.email) {
            return Err("A valid email address is required".to_string());
        }

        let status = super::non_empty(self.status)
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "lead".to_string());
        if !CONTACT_STATUSES.contains(&status.as_str()) {
            return Err(format!(
                "Unknown status '{status}', expected one of {}",
                CONTACT_STATUSES.join(", ")
            ));
        }
        self.status = Some(status);

        Ok(self)
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("lead")
    }
}
