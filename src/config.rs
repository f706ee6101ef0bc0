use std::env;
use std::net::SocketAddr;

use crate::error::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://classroom.db";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub teacher_password: String,
    pub database_url: String,
    pub github_api_url: String,
    pub telegram_api_url: String,
    pub bind_addr: SocketAddr,
    /// Global reminder period used to seed `app_settings`.
    pub notification_check_interval: i64,
    /// Global reminder threshold used to seed `app_settings`.
    pub deadline_warning_hours: i64,
    pub notify_min_tick_seconds: u64,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let teacher_password = required("TEACHER_ACCESS_PASSWORD")?;

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is not a socket address: {}", e)))?;

        Ok(Self {
            telegram_bot_token,
            teacher_password,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            github_api_url: env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| DEFAULT_GITHUB_API_URL.to_string()),
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_URL.to_string()),
            bind_addr,
            notification_check_interval: parsed("NOTIFICATION_CHECK_INTERVAL", 3600)?,
            deadline_warning_hours: parsed("DEADLINE_WARNING_HOURS", 24)?,
            notify_min_tick_seconds: parsed("NOTIFY_MIN_TICK_SECONDS", 30)?,
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("{} is not set", key)))
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} must be a number, got {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}
