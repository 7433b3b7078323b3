mod bootstrap;
mod health;
mod routes;

use anyhow::Result;
use billbot_core::config::{AppConfig, LoadOptions};
use billbot_slack::RequestVerifier;

fn init_logging(config: &AppConfig) {
    use billbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so load it before bootstrap.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let mut state = routes::AppState::new(app.store.clone(), app.cache.clone());
    match app.config.slack.signing_secret.clone() {
        Some(secret) => state = state.with_event_intake(app.events, RequestVerifier::new(secret)),
        None => tracing::warn!(
            event_name = "system.http.events_disabled",
            correlation_id = "bootstrap",
            "slack.signing_secret is unset; POST /slack/events will answer 503"
        ),
    }
    let http = routes::router(state)
        .merge(health::router(health::HealthState::new(app.cache.clone())));

    tracing::info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http surface listening"
    );
    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, http).await {
            tracing::error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http server terminated unexpectedly"
            );
        }
    });

    app.slack_runner.announce_installation(app.config.slack.installer_user_id.clone()).await;
    let runner = app.slack_runner;
    tokio::spawn(async move {
        if let Err(error) = runner.start().await {
            tracing::error!(
                event_name = "system.slack.runner_error",
                correlation_id = "bootstrap",
                error = %error,
                "slack runner stopped"
            );
        }
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "billbot-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "billbot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
