//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vidgen_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vidgen_http_request_duration_seconds";
}

/// Axum middleware recording request counts and latencies.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let path = sanitize_path(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(start.elapsed().as_secs_f64());

    response
}

/// Collapse task ids so the label set stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for segment in path.split('/') {
        if segment.len() >= 32 || uuid::Uuid::parse_str(segment).is_ok() {
            parts.push(":id".to_string());
        } else {
            parts.push(segment.to_string());
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_collapsed() {
        let path = format!("/api/tasks/{}/cancel", uuid::Uuid::new_v4());
        assert_eq!(sanitize_path(&path), "/api/tasks/:id/cancel");
        assert_eq!(sanitize_path("/api/tasks"), "/api/tasks");
    }
}
