//! Request ID middleware.
//!
//! Reuses a well-formed incoming `x-request-id` (a UUID) or generates a new
//! one, runs the request inside a tracing span carrying it, and returns it in
//! the response. The id also names the request's files on disk, so arbitrary
//! client strings are never accepted.

use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use convertforge_common::RequestId;
use tracing::Instrument;

/// Header name used for the request identifier.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Middleware that generates or extracts a request ID.
pub async fn request_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<RequestId>().ok())
        .unwrap_or_default();

    // Handlers read it back with `Extension<RequestId>`.
    request.extensions_mut().insert(id);

    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(val) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), val);
    }

    response
}
