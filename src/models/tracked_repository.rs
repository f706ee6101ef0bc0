use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackedRepository {
    pub id: String,
    pub user_id: String,
    pub repo_full_name: String,
    pub repo_url: Option<String>,
    pub created_at: NaiveDateTime,
}
