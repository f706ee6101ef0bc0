use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub user_id: String,
    pub repo_url: Option<String>,
    pub last_commit_sha: Option<String>,
    pub last_commit_date: Option<NaiveDateTime>,
    pub is_submitted: bool,
    pub submitted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
