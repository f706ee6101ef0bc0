use std::sync::Arc;

use sqlx::SqlitePool;

use crate::chat::ChatGateway;
use crate::classroom::ClassroomClient;
use crate::models::NotifySettings;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub classroom: Arc<dyn ClassroomClient>,
    pub chat: Arc<dyn ChatGateway>,
    pub teacher_password: Arc<str>,
    /// Seed for the global notification settings row.
    pub notify_defaults: NotifySettings,
}
