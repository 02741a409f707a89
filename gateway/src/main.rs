//! Mailgate Web Server - email gateway frontend.
//!
//! This binary provides a thin, fast web server that:
//! - Receives provider webhooks, verifies the signature over the raw body
//! - Applies scheduled-send lifecycle transitions for delivery events
//! - Enqueues verified events to RabbitMQ for the background processor
//! - Exposes the send/schedule/cancel/update surface toward the provider

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, patch, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailgate::provider::{EmailProvider, HttpEmailProvider, MockProvider};
use mailgate::web::{
    cancel_scheduled, health, receive_webhook, send_batch, send_email, update_scheduled, AppState,
};
use mailgate::{Config, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        webhook_secret_configured = config.webhook_secret.is_some(),
        provider_key_configured = config.provider_api_key.is_some(),
        webhook_tolerance_secs = config.webhook_tolerance_secs,
        "config_loaded"
    );

    // Select the provider client; without an API key a mock keeps local
    // runs working, with a loud warning.
    let provider: Arc<dyn EmailProvider> = match &config.provider_api_key {
        Some(api_key) => Arc::new(HttpEmailProvider::new(
            &config.provider_base_url,
            api_key,
            config.request_timeout_ms,
        )?),
        None => {
            warn!("provider_api_key_missing_using_mock");
            Arc::new(MockProvider::default())
        }
    };

    // Create RabbitMQ publisher
    let publisher = Publisher::new(config.amqp_url.clone());
    info!("rabbitmq_publisher_created");

    // Create application state
    let port = config.port;
    let state = AppState::new(config, provider, publisher.clone());

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/webhooks/email", post(receive_webhook))
        .route("/emails", post(send_email))
        .route("/emails/batch", post(send_batch))
        .route("/emails/:id/cancel", post(cancel_scheduled))
        .route("/emails/:id", patch(update_scheduled))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close publisher connection
    publisher.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
