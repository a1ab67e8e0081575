//! Health and metrics endpoint
//!
//! Serves `/healthz`, `/readyz` and `/metrics` (Prometheus text format) for
//! the kubelet probes and the cluster's scraper.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Reconcile counters shared by both controllers
#[derive(Debug, Clone)]
pub struct ReconcileMetrics {
    registry: Arc<Registry>,
    reconciliations: IntCounterVec,
    failures: IntCounterVec,
    duration: HistogramVec,
}

impl ReconcileMetrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Arc::new(Registry::new());

        let reconciliations = IntCounterVec::new(
            Opts::new("nvidia_bmm_reconciliations_total", "Reconcile passes by resource kind and result"),
            &["kind", "result"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("nvidia_bmm_reconcile_errors_total", "Failed reconcile passes by resource kind and error"),
            &["kind", "error"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("nvidia_bmm_reconcile_duration_seconds", "Reconcile pass duration in seconds"),
            &["kind"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            failures,
            duration,
        })
    }

    /// Record a successful pass
    pub fn record_success(&self, kind: &str, elapsed: Duration) {
        self.reconciliations.with_label_values(&[kind, "success"]).inc();
        self.duration.with_label_values(&[kind]).observe(elapsed.as_secs_f64());
    }

    /// Record a failed pass
    pub fn record_failure(&self, kind: &str, error: &ControllerError, elapsed: Duration) {
        self.reconciliations.with_label_values(&[kind, "error"]).inc();
        self.failures.with_label_values(&[kind, error.kind()]).inc();
        self.duration.with_label_values(&[kind]).observe(elapsed.as_secs_f64());
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("metrics output is not UTF-8: {}", e)).into())
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(metrics): State<ReconcileMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Router for the probe and metrics endpoints
pub fn routes(metrics_state: ReconcileMetrics) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics_state)
}

/// Serve the endpoints until the listener fails
pub async fn serve(port: u16, metrics: ReconcileMetrics) -> Result<(), ControllerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Watch(format!("failed to bind health endpoint on {}: {}", addr, e)))?;
    info!("Health and metrics endpoint listening on {}", addr);

    axum::serve(listener, routes(metrics))
        .await
        .map_err(|e| ControllerError::Watch(format!("health endpoint failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmm_client::BmmError;

    #[test]
    fn test_metrics_are_encoded() {
        let metrics = ReconcileMetrics::new().unwrap();
        metrics.record_success("NvidiaBMMCluster", Duration::from_millis(20));
        metrics.record_failure(
            "NvidiaBMMMachine",
            &ControllerError::Bmm(BmmError::NotFound("instance".into())),
            Duration::from_millis(5),
        );

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"nvidia_bmm_reconciliations_total{kind="NvidiaBMMCluster",result="success"} 1"#));
        assert!(text.contains(r#"nvidia_bmm_reconcile_errors_total{error="bmm",kind="NvidiaBMMMachine"} 1"#));
        assert!(text.contains("nvidia_bmm_reconcile_duration_seconds"));
    }

    #[tokio::test]
    async fn test_metrics_handler() {
        let metrics_state = ReconcileMetrics::new().unwrap();
        metrics_state.record_success("NvidiaBMMCluster", Duration::from_millis(1));

        let response = metrics(State(metrics_state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(healthz().await, "ok");
    }
}
