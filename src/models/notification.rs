use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEADLINE_WARNING: &str = "deadline_warning";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub assignment_id: Option<String>,
    pub notification_type: String,
    pub message: Option<String>,
    pub sent_at: NaiveDateTime,
}
