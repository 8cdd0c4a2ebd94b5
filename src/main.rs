//! Server binary for the privacy-notify pipeline:
//! - Link intake and decision endpoints
//! - In-app notification feed
//! - Email delivery via SMTP
//! - Push delivery via FCM
//! - Device token and preference management

use privacy_notify::{config::PipelineConfig, db, routes::create_router, NotificationPipeline};

use axum::serve;
use clap::{Arg, Command};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let matches = create_cli().get_matches();
    let config = load_config(&matches)?;

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    info!("Starting privacy-notify pipeline");
    info!(
        "Configuration: Server {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Enabled channels: Email={}, Push={}",
        config.email.enabled, config.push.enabled
    );

    let pool = db::connect(&config.database).await.map_err(|e| {
        error!("Failed to connect to database: {}", e);
        e
    })?;
    db::run_migrations(&pool).await?;

    let pipeline = Arc::new(NotificationPipeline::new(pool, &config).map_err(|e| {
        error!("Failed to initialize pipeline: {}", e);
        e
    })?);

    let app = create_router(
        Arc::clone(&pipeline),
        Duration::from_secs(config.server.request_timeout_seconds),
    );

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .map_err(|e| format!("Invalid host address: {}", e))?,
        config.server.port,
    );

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!("Pipeline started successfully on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("API base: http://{}/api/v1", addr);

    let cancellation_token = CancellationToken::new();
    let server_task = tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            let server = serve(listener, app);

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Server error: {}", e);
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Server shutdown requested");
                }
            }
        }
    });

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    cancellation_token.cancel();

    if let Err(e) = server_task.await {
        error!("Server task error during shutdown: {}", e);
    }

    info!("privacy-notify pipeline stopped gracefully");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "privacy_notify=info,tower_http=info,axum=info,sqlx=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Create CLI argument parser
fn create_cli() -> Command {
    Command::new("privacy-notify-server")
        .version("1.0.0")
        .about("Status-transition and notification pipeline for the privacy dashboard")
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Server host address"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port"),
        )
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .help("SQLite database URL"),
        )
}

/// Load configuration from environment with CLI overrides
fn load_config(
    matches: &clap::ArgMatches,
) -> Result<PipelineConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = PipelineConfig::from_env().unwrap_or_else(|e| {
        warn!(
            "Failed to load configuration from environment: {}, using defaults",
            e
        );
        PipelineConfig::default()
    });

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }

    if let Some(port_str) = matches.get_one::<String>("port") {
        config.server.port = port_str
            .parse()
            .map_err(|e| format!("Invalid port number '{}': {}", port_str, e))?;
    }

    if let Some(url) = matches.get_one::<String>("database-url") {
        config.database.url = url.clone();
    }

    Ok(config)
}

/// Wait for shutdown signals
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
