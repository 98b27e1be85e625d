use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Instrument;

/// Logs each request and its outcome. Everything the handler logs runs inside
/// a `request` span carrying the request id.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let req_id: String = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let span = tracing::info_span!("request", request_id = %req_id, method = %method, uri = %uri);

    async move {
        tracing::debug!(version = ?request.version(), "incoming request");

        let response = next.run(request).await;

        let duration_ms = start.elapsed().as_millis();
        let status = response.status();

        if status.is_server_error() {
            tracing::error!(status = %status, duration_ms = %duration_ms, "request failed");
        } else if status.is_client_error() {
            tracing::warn!(status = %status, duration_ms = %duration_ms, "request rejected");
        } else {
            tracing::info!(status = %status, duration_ms = %duration_ms, "request completed");
        }

        response
    }
    .instrument(span)
    .await
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
