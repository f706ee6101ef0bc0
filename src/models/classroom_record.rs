use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Snapshot row of one student's state on one remote assignment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClassroomRecord {
    pub id: String,
    pub teacher_user_id: String,
    pub classroom_id: Option<String>,
    pub classroom_name: Option<String>,
    pub assignment_id: Option<String>,
    pub assignment_title: Option<String>,
    pub assignment_url: Option<String>,
    pub deadline: Option<NaiveDateTime>,
    pub student_login: Option<String>,
    pub student_display_login: Option<String>,
    pub student_repo_url: Option<String>,
    pub submitted: Option<bool>,
    pub passed: Option<bool>,
    pub grade: Option<String>,
    pub commit_count: Option<i64>,
    pub raw_json: String,
    pub fetched_at: NaiveDateTime,
}

/// Flattened record produced by a sync pass, before it is written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewClassroomRecord {
    pub classroom_id: Option<String>,
    pub classroom_name: Option<String>,
    pub assignment_id: Option<String>,
    pub assignment_title: Option<String>,
    pub assignment_url: Option<String>,
    pub deadline: Option<NaiveDateTime>,
    pub student_login: Option<String>,
    pub student_display_login: Option<String>,
    pub student_repo_url: Option<String>,
    pub submitted: Option<bool>,
    pub passed: Option<bool>,
    pub grade: Option<String>,
    pub commit_count: Option<i64>,
    pub raw: serde_json::Value,
}
