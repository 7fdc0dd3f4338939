//! socialgate - access-controlled social content API.

use anyhow::Context;
use socialgate::config::{Config, LogFormat, validation};
use socialgate::db::Database;
use socialgate::http::{self, AppState};
use socialgate::mailer::SandboxMailer;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    init_tracing(config.server.log_format);

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "invalid configuration");
        }
        anyhow::bail!("refusing to start with {} configuration error(s)", errors.len());
    }

    info!(
        env = %config.server.environment,
        listen = %config.server.listen,
        api_url = %config.server.api_url,
        "Starting socialgate"
    );

    if !config.mail.sandbox {
        warn!("No mail transport is bundled; activation emails are logged as in sandbox mode");
    }

    let db = Arc::new(Database::new(&config.database.path).await?);
    let mailer = Arc::new(SandboxMailer::new(config.mail.from_email.clone()));
    let config = Arc::new(config);

    let state = AppState::new(config.clone(), db.clone(), db, mailer)
        .context("failed to initialize session tokens")?;

    // Metrics listener (0 disables)
    if let Some(port) = config.server.metrics_port.filter(|port| *port != 0) {
        socialgate::metrics::init();
        tokio::spawn(http::run_metrics_server(port));
    }

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    info!(addr = %config.server.listen, "API listening");

    http::serve(listener, http::router(state)).await?;

    info!("socialgate stopped");
    Ok(())
}
