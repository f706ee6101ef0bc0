use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classroom_assistant::api::router;
use classroom_assistant::chat::TelegramGateway;
use classroom_assistant::classroom::GithubHttpClient;
use classroom_assistant::config::AppConfig;
use classroom_assistant::db;
use classroom_assistant::models::NotifySettings;
use classroom_assistant::services::NotificationScheduler;
use classroom_assistant::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "classroom_assistant=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;
    let pool = db::connect(&config.database_url).await?;

    let classroom = Arc::new(GithubHttpClient::new(&config.github_api_url)?);
    let chat = Arc::new(TelegramGateway::new(
        &config.telegram_api_url,
        &config.telegram_bot_token,
    )?);
    let notify_defaults = NotifySettings {
        threshold_hours: config.deadline_warning_hours,
        period_seconds: config.notification_check_interval,
    };

    let scheduler = NotificationScheduler::new(
        pool.clone(),
        chat.clone(),
        notify_defaults,
        config.notify_min_tick_seconds,
    );
    tokio::spawn(async move {
        scheduler.start().await;
    });

    let state = AppState {
        db: pool,
        classroom,
        chat,
        teacher_password: Arc::from(config.teacher_password.as_str()),
        notify_defaults,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
