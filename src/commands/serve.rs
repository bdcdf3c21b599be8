use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{Instrument, error, info, warn};

use advisory_backend::config::{AppConfig, NOTIFIER_SHUTDOWN_TIMEOUT};
use advisory_backend::email::provider_from_env;
use advisory_backend::gateway::{Gateway, build_pool};
use advisory_backend::metrics::{init_metrics, initialize_metrics, process_metrics_task};
use advisory_backend::notifier::Notifier;
use advisory_backend::stripe_client::StripeCheckoutProvider;
use advisory_backend::stripe_webhooks::WebhookVerifier;
use advisory_backend::web::{AppState, build_router, cors_layer, start_web_server};

use super::migrate::run_pending_migrations;

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal (Ctrl+C), initiating graceful shutdown..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}

pub async fn handle_serve(config: AppConfig, interface: String, port: u16) -> Result<()> {
    init_metrics()?;
    initialize_metrics();
    tokio::spawn(
        process_metrics_task().instrument(tracing::info_span!("process_metrics")),
    );

    let database_url = config.database_url.clone();
    let applied = tokio::task::spawn_blocking(move || run_pending_migrations(&database_url))
        .await
        .context("Migration task panicked")??;
    info!(applied, "Database migrations checked");

    let pool = build_pool(&config.database_url, config.pool_size, config.pool_timeout)
        .context("Failed to create database pool")?;
    info!(
        pool_size = config.pool_size,
        timeout_secs = config.pool_timeout.as_secs(),
        "Database pool ready"
    );

    let provider = provider_from_env()?;
    let notifier = Notifier::start(provider, config.notifier.clone());

    let mut state = AppState::new(Gateway::new(pool)).with_notifier(notifier.handle());
    match &config.stripe {
        Some(stripe) => {
            state = state.with_checkout(Arc::new(StripeCheckoutProvider::new(stripe.clone())));
        }
        None => warn!("Stripe is not configured, checkout is disabled"),
    }
    match &config.webhook_secret {
        Some(secret) => {
            let verifier =
                WebhookVerifier::new(secret.clone()).with_tolerance(config.webhook_tolerance);
            state = state.with_webhook_verifier(verifier);
        }
        None => warn!("STRIPE_WEBHOOK_SECRET is not set, webhooks will be refused"),
    }

    let app = build_router(state, cors_layer(&config.cors_allowed_origins));
    let served = start_web_server(&interface, port, app, shutdown_signal()).await;

    let report = notifier.shutdown(NOTIFIER_SHUTDOWN_TIMEOUT).await;
    if report.discarded > 0 || report.timed_out {
        warn!(
            discarded = report.discarded,
            timed_out = report.timed_out,
            "Notifier stopped before every notification was sent"
        );
    } else {
        info!("Notifier stopped cleanly");
    }

    served
}
