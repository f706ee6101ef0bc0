use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::chat::ChatGateway;
use crate::db::repository;
use crate::error::AppError;
use crate::models::NotifySettings;
use crate::services::notifier::{NotificationEngine, NotifyStats};

/// Half the shortest reminder period, never below `floor_secs`.
pub fn compute_tick(
    global_period_secs: i64,
    user_periods: impl IntoIterator<Item = i64>,
    floor_secs: u64,
) -> Duration {
    let shortest = user_periods
        .into_iter()
        .filter(|p| *p > 0)
        .fold(global_period_secs.max(0), i64::min);
    let half = u64::try_from(shortest / 2).unwrap_or(0);
    Duration::from_secs(half.max(floor_secs))
}

/// Runs the notification engine on a fixed tick.
pub struct NotificationScheduler {
    db: SqlitePool,
    engine: NotificationEngine,
    defaults: NotifySettings,
    floor_secs: u64,
}

impl NotificationScheduler {
    pub fn new(
        db: SqlitePool,
        chat: Arc<dyn ChatGateway>,
        defaults: NotifySettings,
        floor_secs: u64,
    ) -> Self {
        Self {
            engine: NotificationEngine::new(db.clone(), chat, defaults),
            db,
            defaults,
            floor_secs,
        }
    }

    /// Tick derived from the stored settings and every user's period override.
    pub async fn tick_interval(&self) -> Result<Duration, AppError> {
        let settings = repository::get_or_create_settings(&self.db, self.defaults).await?;
        let overrides = repository::fetch_users(&self.db)
            .await?
            .into_iter()
            .filter_map(|u| u.notify_period_seconds);
        Ok(compute_tick(
            settings.notify_period_seconds,
            overrides,
            self.floor_secs,
        ))
    }

    /// Loops forever; a failed pass is logged and the loop carries on.
    pub async fn start(self) {
        let interval = match self.tick_interval().await {
            Ok(interval) => interval,
            Err(e) => {
                warn!("Could not compute notification tick, using floor: {}", e);
                Duration::from_secs(self.floor_secs)
            }
        };
        info!("Starting notification scheduler (interval: {:?})", interval);

        loop {
            tokio::time::sleep(interval).await;

            match self.run_once().await {
                Ok(stats) => {
                    info!(
                        "Notification pass completed - sent: {}, failed: {}, skipped: {}",
                        stats.sent, stats.failed, stats.skipped
                    );
                }
                Err(e) => {
                    warn!("Notification pass failed: {:?}", e);
                }
            }
        }
    }

    /// One notification pass at the current time.
    pub async fn run_once(&self) -> Result<NotifyStats, AppError> {
        self.engine.run_once(Utc::now().naive_utc()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_halves_shortest_period() {
        assert_eq!(compute_tick(3600, [], 30), Duration::from_secs(1800));
        assert_eq!(compute_tick(3600, [600, 7200], 30), Duration::from_secs(300));
        assert_eq!(compute_tick(3600, [40], 30), Duration::from_secs(30));
        assert_eq!(compute_tick(3600, [0, -5], 30), Duration::from_secs(1800));
    }
}
