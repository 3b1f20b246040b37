//! rt-mail - Inbound email gateway for Request Tracker.
//!
//! Receives provider webhooks (Mailgun, SendGrid, SparkPost, AWS SES via
//! SNS) and files each message into the RT queue its recipient maps to.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rtmail::fetch::build_client;
use rtmail::web::router;
use rtmail::{
    AddressRouter, AppState, CertificateCache, Config, HttpFetcher, NotificationDispatcher,
    RtClient, RtConfig, S3ObjectStore, SignatureVerifier,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    let rt_config = RtConfig::load(&config.rt_config_path)?;
    let rt_url = rt_config.gateway_url()?;
    info!(
        port = config.port,
        rt_config = %config.rt_config_path.display(),
        rt_url = %rt_url,
        queues = rt_config.queues.len(),
        ses_topic_arn = ?config.ses_topic_arn,
        aws_region = %config.aws_region,
        s3_endpoint = ?config.s3_endpoint,
        mailgun_signing_configured = config.mailgun_signing_key.is_some(),
        "config_loaded"
    );

    let client = build_client(config.connect_timeout, config.http_timeout)
        .context("Failed to build HTTP client")?;

    let ticketing = Arc::new(RtClient::new(
        client.clone(),
        rt_url,
        AddressRouter::new(rt_config.queues),
    ));

    let mut state = AppState::new(config.clone(), ticketing.clone());

    match &config.ses_topic_arn {
        Some(topic_arn) => {
            let fetcher = Arc::new(HttpFetcher::new(client.clone()));
            let certificates =
                Arc::new(CertificateCache::new(fetcher.clone(), config.cert_cache_ttl));

            // Credentials resolve through the default AWS provider chain
            let aws_config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.aws_region.clone()))
                .load()
                .await;
            let object_store = Arc::new(S3ObjectStore::from_sdk_config(
                &aws_config,
                config.s3_endpoint.as_deref(),
                config.connect_timeout,
                config.http_timeout,
            ));

            let dispatcher = NotificationDispatcher::new(
                SignatureVerifier::new(certificates),
                fetcher,
                object_store,
                ticketing,
                topic_arn.clone(),
            )
            .with_max_email_bytes(config.max_email_bytes);

            state = state.with_dispatcher(dispatcher);
            info!(topic_arn = %topic_arn, "ses_endpoint_enabled");
        }
        None => warn!("SES_TOPIC_ARN not set, /ses endpoint disabled"),
    }

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

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
