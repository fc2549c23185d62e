mod ai;
mod app;
mod auth;
mod chat;
mod config;
mod dates;
mod db;
mod error;
mod extract;
mod groups;
mod metrics;
mod seed;
mod state;
mod store;
mod users;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "coachhub=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;
    let seeded = seed::ensure_defaults(&state).await?;
    tracing::info!(bot = %seeded.bot.username, "coach account ready");

    app::serve(app::build_app(state)).await
}
