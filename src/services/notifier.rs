use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::chat::ChatGateway;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Assignment, DEADLINE_WARNING, NotifySettings, User};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotifyStats {
    pub sent: usize,
    pub failed: usize,
    /// Eligible reminders held back because the previous one is too recent.
    pub skipped: usize,
}

/// Decides which deadline reminders are due and delivers them.
pub struct NotificationEngine {
    db: SqlitePool,
    chat: Arc<dyn ChatGateway>,
    defaults: NotifySettings,
}

impl NotificationEngine {
    pub fn new(db: SqlitePool, chat: Arc<dyn ChatGateway>, defaults: NotifySettings) -> Self {
        Self { db, chat, defaults }
    }

    /// One pass over every user: send the reminders that are due.
    pub async fn run_once(&self, now: NaiveDateTime) -> Result<NotifyStats, AppError> {
        let settings =
            NotifySettings::from(&repository::get_or_create_settings(&self.db, self.defaults).await?);
        let mut stats = NotifyStats::default();

        for user in repository::fetch_users(&self.db).await? {
            self.notify_user(&user, settings, now, &mut stats).await?;
        }

        debug!("Notification pass finished: {:?}", stats);
        Ok(stats)
    }

    async fn notify_user(
        &self,
        user: &User,
        settings: NotifySettings,
        now: NaiveDateTime,
        stats: &mut NotifyStats,
    ) -> Result<(), AppError> {
        let threshold = settings.threshold_for(user);
        let window_end = Duration::try_hours(threshold).and_then(|d| now.checked_add_signed(d));
        let period = Duration::try_seconds(settings.period_for(user));
        let (Some(window_end), Some(period)) = (window_end, period) else {
            warn!(
                "Skipping reminders for chat {}: settings out of range ({}h, {}s)",
                user.chat_id,
                threshold,
                settings.period_for(user)
            );
            return Ok(());
        };

        let candidates = repository::fetch_reminder_candidates(&self.db, &user.id).await?;
        for assignment in candidates {
            let Some(deadline) = assignment.deadline else {
                continue;
            };
            if deadline <= now || deadline > window_end {
                continue;
            }

            let last_sent = repository::last_notification_sent_at(
                &self.db,
                &user.id,
                &assignment.id,
                DEADLINE_WARNING,
            )
            .await?;
            if last_sent.is_some_and(|sent| now - sent < period) {
                stats.skipped += 1;
                continue;
            }

            let message = reminder_message(&assignment, deadline, now);
            match self.chat.send_message(user.chat_id, &message).await {
                Ok(()) => {
                    repository::insert_notification(
                        &self.db,
                        &user.id,
                        &assignment.id,
                        DEADLINE_WARNING,
                        &message,
                        now,
                    )
                    .await?;
                    stats.sent += 1;
                    info!("Reminder for {} sent to chat {}", assignment.name, user.chat_id);
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        "Reminder for {} to chat {} failed: {}",
                        assignment.name, user.chat_id, e
                    );
                }
            }
        }
        Ok(())
    }
}

/// `2d 5h` style; days are omitted under 24 hours.
pub fn format_remaining(remaining: Duration) -> String {
    let days = remaining.num_days();
    let hours = remaining.num_hours() % 24;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else {
        format!("{}h", hours)
    }
}

/// Text of a deadline reminder, also stored in the notification history.
pub fn reminder_message(assignment: &Assignment, deadline: NaiveDateTime, now: NaiveDateTime) -> String {
    format!(
        "⏰ Deadline Reminder\n\n📚 {}\n📅 Deadline: {} UTC\n⏳ Time left: {}\n🔗 Repository: {}",
        assignment.name,
        deadline.format("%Y-%m-%d %H:%M:%S"),
        format_remaining(deadline - now),
        assignment.repository_label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::minutes(179)), "2h");
        assert_eq!(format_remaining(Duration::hours(49)), "2d 1h");
        assert_eq!(format_remaining(Duration::hours(24)), "1d 0h");
    }
}
