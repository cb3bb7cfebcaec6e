use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Logs method, path, status and latency of every request.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    if status.is_server_error() {
        tracing::warn!("{} {} -> {} ({:.1}ms)", method, path, status, elapsed_ms);
    } else {
        tracing::info!("{} {} -> {} ({:.1}ms)", method, path, status, elapsed_ms);
    }

    response
}
