use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub repo_name: String,
    pub repo_url: Option<String>,
    pub deadline: Option<NaiveDateTime>,
    pub classroom_id: Option<String>,
    pub classroom_assignment_id: Option<String>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Assignment {
    /// Repository as shown to users: the URL when known, else the stored name.
    pub fn repository_label(&self) -> &str {
        self.repo_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.repo_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssignment {
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub repo_name: String,
    pub repo_url: Option<String>,
    pub deadline: Option<NaiveDateTime>,
    pub classroom_id: Option<String>,
    pub classroom_assignment_id: Option<String>,
}
