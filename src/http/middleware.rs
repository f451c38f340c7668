//! Rate limit middleware applied in front of every route.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{HeaderMap, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use super::server::AppState;
use crate::error::RateLimitExceeded;
use crate::ratelimit::ClientIdentity;

/// Header consulted for the original client when running behind a proxy.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Work out who is calling.
///
/// Uses the first `X-Forwarded-For` hop when `trust_forwarded_for` is set and
/// the header parses, then the peer socket address, and finally the shared
/// fallback identity.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> ClientIdentity {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ClientIdentity::from_ip(ip);
        }
    }

    match peer {
        Some(addr) => ClientIdentity::from_ip(addr.ip()),
        None => ClientIdentity::fallback(),
    }
}

/// Consult the gate before any downstream handler runs.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer, state.trust_forwarded_for);

    if identity.is_fallback() {
        debug!(path = %request.uri().path(), "No client address, using fallback identity");
    }

    match state.gate.admit(&identity).into_result() {
        Ok(()) => next.run(request).await,
        Err(exceeded) => {
            warn!(
                identity = %identity,
                path = %request.uri().path(),
                retry_after_secs = exceeded.retry_after_secs,
                "Rejecting request over rate limit"
            );
            exceeded.into_response()
        }
    }
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "retryAfter": self.retry_after_secs,
        }));

        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
        response
    }
}
