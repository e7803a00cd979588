//! Request correlation ids.
//!
//! Every request runs inside a `request` tracing span carrying its id, so log
//! lines emitted anywhere below the router (the identity library included)
//! can be grouped per request.

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderMap, HeaderValue, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id accepted; longer ones are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Caller-supplied id if it is usable, a fresh uuid v4 otherwise
fn incoming_or_new(headers: &HeaderMap) -> RequestId {
    let incoming = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN);

    match incoming {
        Some(id) => RequestId(id.to_string()),
        None => RequestId(Uuid::new_v4().to_string()),
    }
}

/// Tag the request with an id, echo it on the response and log timing.
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get, middleware};
/// use mi_server::api::request_id::request_id_middleware;
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { "Hello" }))
///     .layer(middleware::from_fn(request_id_middleware));
/// ```
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = incoming_or_new(request.headers());
    let span = tracing::info_span!(
        "request",
        request_id = %request_id.as_str(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(request_id.clone());

    async move {
        let started = Instant::now();
        tracing::debug!("Request started");

        let mut response = next.run(request).await;
        if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}

/// Id of the current request, available to handlers as an extractor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Falls back to a fresh id when the middleware is not installed.
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| RequestId(Uuid::new_v4().to_string())))
    }
}
