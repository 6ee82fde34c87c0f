//! Endpoint server for exposing metrics and health checks

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::metrics::PrometheusRecorder;

/// Routes served on the metrics listener
pub fn metrics_router(recorder: Arc<PrometheusRecorder>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/debug/metrics/prometheus", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(recorder)
}

async fn metrics_handler(State(recorder): State<Arc<PrometheusRecorder>>) -> impl IntoResponse {
    match recorder.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Start the endpoint server and serve until `shutdown` resolves
pub async fn endpoint_server(
    addr: &str,
    recorder: Arc<PrometheusRecorder>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;

    tracing::info!(addr, "Metrics endpoint listening");

    axum::serve(listener, metrics_router(recorder))
        .with_graceful_shutdown(shutdown)
        .await
        .context("metrics server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Recorder;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let recorder = Arc::new(PrometheusRecorder::new().unwrap());
        recorder.inc_api_error("mev_params", -38006);

        for path in ["/metrics", "/debug/metrics/prometheus"] {
            let (status, body) = get_text(metrics_router(recorder.clone()), path).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("mev_sentry_api_errors_total"));
        }
    }

    #[tokio::test]
    async fn test_health() {
        let recorder = Arc::new(PrometheusRecorder::new().unwrap());
        let (status, body) = get_text(metrics_router(recorder), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
