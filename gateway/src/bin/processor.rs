//! Mailgate Processor - verified-event dispatcher.
//!
//! This binary:
//! 1. Consumes verified webhook events from the email_events queue
//! 2. Dispatches each event by kind (bounce/complaint alerting, logging)
//! 3. Acknowledges or requeues based on the dispatch outcome
//!
//! Keeping dispatch behind the queue lets the web server acknowledge
//! webhook deliveries without waiting on downstream systems.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Connection, ConnectionProperties,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailgate::{dispatch_event, AlertSink, Config, WebhookEvent, EVENTS_QUEUE};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("processor_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        concurrency = config.worker_concurrency,
        alerts_configured = config.alert_webhook_url.is_some(),
        "config_loaded"
    );

    // Run the processor
    run(config).await?;

    Ok(())
}

/// Run the processor.
async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    // Connect to RabbitMQ for consuming
    info!(url_length = config.amqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&config.amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    // Create a channel for consuming
    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    info!("rabbitmq_channel_created");

    // Set QoS with high prefetch for concurrent processing
    let prefetch_count = config.worker_concurrency as u16;
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");

    // Declare the queue (idempotent operation)
    channel
        .queue_declare(
            EVENTS_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare events queue")?;

    info!(queue = EVENTS_QUEUE, "rabbitmq_queue_declared");

    // Shared alert sink for all dispatched events
    let alerts = AlertSink::new(
        config.alert_webhook_url.clone(),
        config.request_timeout_ms,
    )
    .context("Failed to create alert sink")?;

    // Start consuming from the events queue
    let mut consumer = channel
        .basic_consume(
            EVENTS_QUEUE,
            "mailgate-processor",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = EVENTS_QUEUE, "rabbitmq_consumer_started");
    info!("processor_ready");

    // Clone channel for use in message handlers
    let channel = Arc::new(channel);

    // Create shutdown signal future
    let shutdown = async {
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
    };

    // Pin the shutdown future
    tokio::pin!(shutdown);

    // Process messages until shutdown
    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = &mut shutdown => {
                info!("processor_stopping");
                break;
            }
            // Process next message
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let delivery_tag = delivery.delivery_tag;
                        let message_id = delivery
                            .properties
                            .message_id()
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "unknown".to_string());

                        info!(
                            queue = EVENTS_QUEUE,
                            message_id = %message_id,
                            delivery_tag = delivery_tag,
                            body_length = delivery.data.len(),
                            "rabbitmq_event_received"
                        );

                        // Clone resources for the spawned task
                        let alerts = alerts.clone();
                        let channel = Arc::clone(&channel);

                        // Spawn a task to process this message
                        tokio::spawn(async move {
                            let event: Result<WebhookEvent, _> =
                                serde_json::from_slice(&delivery.data);

                            match event {
                                Ok(event) => match dispatch_event(&event, &alerts).await {
                                    Ok(outcome) => {
                                        if let Err(e) = channel
                                            .basic_ack(delivery_tag, BasicAckOptions::default())
                                            .await
                                        {
                                            error!(
                                                delivery_tag = delivery_tag,
                                                error = %e,
                                                "rabbitmq_ack_failed"
                                            );
                                        } else {
                                            info!(
                                                message_id = %message_id,
                                                kind = %event.kind,
                                                outcome = ?outcome,
                                                "event_dispatched"
                                            );
                                        }
                                    }
                                    Err(e) => {
                                        error!(
                                            message_id = %message_id,
                                            kind = %event.kind,
                                            error = %e,
                                            "event_dispatch_failed"
                                        );

                                        // Nack and requeue; alert delivery
                                        // failures are transient
                                        let _ = channel
                                            .basic_nack(
                                                delivery_tag,
                                                BasicNackOptions {
                                                    requeue: true,
                                                    ..Default::default()
                                                },
                                            )
                                            .await;
                                    }
                                },
                                Err(e) => {
                                    error!(
                                        message_id = %message_id,
                                        error = %e,
                                        body_preview = %String::from_utf8_lossy(
                                            &delivery.data[..delivery.data.len().min(500)]
                                        ),
                                        "event_parse_failed"
                                    );

                                    // Nack and don't requeue on parse error
                                    // (the message is likely malformed)
                                    let _ = channel
                                        .basic_nack(
                                            delivery_tag,
                                            BasicNackOptions {
                                                requeue: false,
                                                ..Default::default()
                                            },
                                        )
                                        .await;
                                }
                            }
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    info!("processor_shutdown_complete");
    Ok(())
}
