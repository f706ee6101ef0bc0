use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::User;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AppSettings {
    pub id: i64,
    pub notify_threshold_hours: i64,
    pub notify_period_seconds: i64,
    pub updated_at: NaiveDateTime,
}

/// Global notification defaults, resolved once per operation and passed down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifySettings {
    pub threshold_hours: i64,
    pub period_seconds: i64,
}

impl NotifySettings {
    pub fn threshold_for(&self, user: &User) -> i64 {
        user.notify_threshold_hours.unwrap_or(self.threshold_hours)
    }

    pub fn period_for(&self, user: &User) -> i64 {
        user.notify_period_seconds.unwrap_or(self.period_seconds)
    }
}

impl From<&AppSettings> for NotifySettings {
    fn from(settings: &AppSettings) -> Self {
        Self {
            threshold_hours: settings.notify_threshold_hours,
            period_seconds: settings.notify_period_seconds,
        }
    }
}
