use axum::{http::StatusCode, routing::get, Router};
use sensorhub::config::Config;
use sensorhub::db::{self, PgStore};
use sensorhub::password::Argon2PasswordService;
use sensorhub::rest::{self, AppState};
use sensorhub::metrics;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensorhub=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    info!("Starting SensorHub");
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());

    metrics::init_metrics()?;

    let pool = match db::make_pool(&config.database_url, config.db_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(PgStore::new(pool));
    let state = AppState::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(Argon2PasswordService::new()),
        &config.jwt_secret,
    );

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }))
        .merge(rest::create_router(state))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Received shutdown signal");
}

async fn metrics_handler() -> Result<String, StatusCode> {
    metrics::gather_metrics().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
