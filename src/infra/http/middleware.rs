use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::{api_keys::ApiPrincipal, error::ErrorReport};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Per-request data shared with handlers and the response logger.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get(&REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN);

        let request_id = match forwarded {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        Self { request_id }
    }
}

/// Reuses a caller-supplied `x-request-id` when it is sane, otherwise mints one.
/// The id is echoed back on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext::from_headers(request.headers());
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Logs every 4xx/5xx with the diagnostic chain handlers attached as an `ErrorReport`.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let caller = caller_label(response.extensions().get::<ApiPrincipal>());
    let (source, chain) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = chain.first().map(String::as_str).unwrap_or("-");

    if status.is_server_error() {
        error!(
            target = "bookshelf::http::response",
            status = status.as_u16(),
            %method,
            %path,
            elapsed_ms,
            source,
            detail,
            chain = ?chain,
            request_id = %request_id,
            caller = %caller,
            "request failed",
        );
    } else {
        warn!(
            target = "bookshelf::http::response",
            status = status.as_u16(),
            %method,
            %path,
            elapsed_ms,
            source,
            detail,
            request_id = %request_id,
            caller = %caller,
            "request rejected",
        );
    }

    response
}

/// `name:fingerprint/role` for authenticated callers, `anonymous` otherwise.
fn caller_label(principal: Option<&ApiPrincipal>) -> String {
    match principal {
        Some(principal) => {
            let role = principal.role.map(|role| role.as_str()).unwrap_or("public");
            format!("{}:{}/{}", principal.name, principal.fingerprint, role)
        }
        None => "anonymous".to_string(),
    }
}
