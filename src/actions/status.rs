//! Health endpoint
//!
//! Reports whether the database answers, how long the process has been up,
//! and the notifier's queue counters.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

use crate::gateway::Statement;
use crate::notifier::NotifierStats;
use crate::web::AppState;

static SERVER_START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record the process start; later calls keep the first instant
pub fn init_server_start_time() {
    SERVER_START_TIME.get_or_init(Instant::now);
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub uptime_seconds: u64,
    pub uptime_human: String,
    pub notifier: NotifierStats,
}

fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, secs)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    let uptime_seconds = SERVER_START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let database = match state.gateway.write(Statement::new("SELECT 1")).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!(error = %e, "Health check could not reach the database");
            "unavailable"
        }
    };
    let healthy = database == "ok";

    let report = HealthReport {
        ok: healthy,
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        uptime_seconds,
        uptime_human: format_duration(uptime_seconds),
        notifier: state.notifier.stats(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
