//! Prometheus metrics and the probe/metrics HTTP endpoint.

use crate::error::ControllerError;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Counters exported by the controller
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Post attempts by outcome ("success", "partial", "failed")
    pub posts_total: IntCounterVec,
    pub retries_total: IntCounter,
    pub stale_responses_total: IntCounter,
    /// Status updates applied, by resource kind
    pub status_updates_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new_custom(Some("lb_controller".to_string()), None)?;

        let posts_total = IntCounterVec::new(
            Opts::new("posts_total", "Declaration post attempts by outcome"),
            &["outcome"],
        )?;
        let retries_total = IntCounter::new("retries_total", "Retries scheduled for failed tenants")?;
        let stale_responses_total = IntCounter::new(
            "stale_responses_total",
            "Post outcomes dropped because a newer generation exists",
        )?;
        let status_updates_total = IntCounterVec::new(
            Opts::new("status_updates_total", "Resource status updates applied"),
            &["kind"],
        )?;

        registry.register(Box::new(posts_total.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(stale_responses_total.clone()))?;
        registry.register(Box::new(status_updates_total.clone()))?;

        Ok(Self {
            registry,
            posts_total,
            retries_total,
            stale_responses_total,
            status_updates_total,
        })
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| ControllerError::Metrics(e.to_string()))
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Result<String, (StatusCode, String)> {
    metrics
        .render()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(metrics)
        .layer(TraceLayer::new_for_http())
}

/// Serve `/metrics` and `/healthz` until the listener fails.
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Metrics(format!("failed to bind {}: {}", addr, e)))?;
    info!("Serving metrics on {}", addr);
    axum::serve(listener, router(metrics))
        .await
        .map_err(|e| ControllerError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.retries_total.inc();
        metrics.posts_total.with_label_values(&["success"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("lb_controller_retries_total 1"));
        assert!(text.contains("lb_controller_posts_total{outcome=\"success\"} 1"));
    }
}
