use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Get the default tracing layer for HTTP requests
pub fn get_tracing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

/// Tags each request with an id and logs its outcome.
///
/// An incoming `x-request-id` is kept; otherwise a fresh one is generated.
/// The id is echoed on the response.
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().clone();
    let organization_id = request
        .headers()
        .get("x-organization-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header_value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        organization_id = %organization_id,
        "Incoming HTTP request"
    );

    let span = info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let mut response = next.run(request).instrument(span).await;

    let duration = start_time.elapsed();
    let status = response.status();
    if status.is_server_error() {
        error!(
            request_id = %request_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "HTTP request failed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            request_id = %request_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "HTTP request failed with client error"
        );
    } else {
        info!(
            request_id = %request_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "HTTP request completed"
        );
    }

    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
