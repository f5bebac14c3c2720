use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use super::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id taken from `x-request-id` or freshly generated.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let span = info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    );

    async move {
        let started_at = Instant::now();
        let mut response = next.run(request).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        let status = response.status();

        if !status.is_client_error() && !status.is_server_error() {
            debug!(status = status.as_u16(), elapsed_ms, "request served");
            return response;
        }

        let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages.first().map(String::as_str).unwrap_or("no diagnostic available");

        if status.is_server_error() {
            error!(
                target: "glossa::http::response",
                status = status.as_u16(),
                elapsed_ms,
                source,
                detail,
                chain = ?messages,
                "request failed"
            );
        } else {
            warn!(
                target: "glossa::http::response",
                status = status.as_u16(),
                elapsed_ms,
                source,
                detail,
                "client request error"
            );
        }
        response
    }
    .instrument(span)
    .await
}
