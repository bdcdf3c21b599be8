use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once per process
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        )
        .context("failed to set buckets for http_request_duration_seconds")?
        .set_buckets_for_metric(
            Matcher::Suffix("duration_ms".to_string()),
            &[
                1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0,
            ],
        )
        .context("failed to set buckets for duration_ms metrics")?
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    match METRICS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Register counters at zero so they show up before the first event
pub fn initialize_metrics() {
    metrics::counter!("webhook.received_total").absolute(0);
    metrics::counter!("webhook.processed_total").absolute(0);
    metrics::counter!("webhook.already_processed_total").absolute(0);
    metrics::counter!("webhook.store_failed_total").absolute(0);
    metrics::counter!("webhook.ignored_total").absolute(0);
    metrics::counter!("webhook.rejected_total").absolute(0);

    metrics::counter!("notifier.submitted_total").absolute(0);
    metrics::counter!("notifier.sent_total").absolute(0);
    metrics::counter!("notifier.failed_total").absolute(0);
    metrics::counter!("notifier.dropped_total").absolute(0);
    metrics::gauge!("notifier.queue_depth").set(0.0);

    metrics::counter!("gateway.unavailable_total").absolute(0);
    metrics::counter!("gateway.query_failed_total").absolute(0);

    metrics::counter!("intake.leads_created_total").absolute(0);
    metrics::counter!("intake.concierge_created_total").absolute(0);
    metrics::counter!("intake.contact_created_total").absolute(0);
    metrics::counter!("intake.newsletter_created_total").absolute(0);
}

/// Background task to update process metrics every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status")
                && let Some(kb) = status
                    .lines()
                    .find(|line| line.starts_with("VmRSS:"))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<f64>().ok())
            {
                metrics::gauge!("process.memory.bytes").set(kb * 1024.0);
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
