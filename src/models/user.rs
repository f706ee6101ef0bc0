use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub github_username: Option<String>,
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    pub notify_threshold_hours: Option<i64>,
    pub notify_period_seconds: Option<i64>,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }

    /// Token with surrounding whitespace removed; `None` when unset or blank.
    pub fn token(&self) -> Option<&str> {
        self.github_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Human-readable label used in listings and exports.
    pub fn display_name(&self) -> String {
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full_name.is_empty() {
            return full_name;
        }
        if let Some(username) = self.username.as_deref().filter(|s| !s.trim().is_empty()) {
            return format!("@{}", username.trim());
        }
        if let Some(login) = self.github_username.as_deref().filter(|s| !s.trim().is_empty()) {
            return login.trim().to_string();
        }
        format!("user {}", self.chat_id)
    }
}

/// Who sent a chat message, as reported by the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatIdentity {
    pub chat_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}
