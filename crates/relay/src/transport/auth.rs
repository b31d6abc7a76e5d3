// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;

use crate::error::RelayError;
use crate::state::RelayState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate an `Authorization: Basic base64(user:pass)` header against the
/// configured credential store. An empty store means write endpoints are
/// unauthenticated.
pub fn validate_basic(headers: &HeaderMap, pairs: &[(String, String)]) -> Result<(), RelayError> {
    if pairs.is_empty() {
        return Ok(());
    }

    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayError::Unauthorized)?;
    let encoded = raw.strip_prefix("Basic ").ok_or(RelayError::Unauthorized)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| RelayError::Unauthorized)?;
    let decoded = String::from_utf8(decoded).map_err(|_| RelayError::Unauthorized)?;
    let (user, pass) = decoded.split_once(':').ok_or(RelayError::Unauthorized)?;

    for (u, p) in pairs {
        if constant_time_eq(user, u) && constant_time_eq(pass, p) {
            return Ok(());
        }
    }
    Err(RelayError::Unauthorized)
}

/// Route-scoped middleware enforcing Basic auth. Attached only to
/// `POST /streams` and `PUT /streams/{*key}` — publish and subscribe are
/// unaffected, matching the external HTTP surface.
pub async fn require_basic_auth(
    State(state): State<Arc<RelayState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Err(code) = validate_basic(req.headers(), &state.config.credential_pairs()) {
        state.counters.auth_rejections.fetch_add(1, Ordering::Relaxed);
        let body = crate::error::ErrorResponse { error: code.to_error_body("unauthorized") };
        return (
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            axum::Json(body),
        )
            .into_response();
    }
    next.run(req).await
}

/// Global middleware: 301-redirect to HTTPS when enforcement is on and
/// `X-Forwarded-Proto` is not `https`. A no-op unless
/// `RelayConfig::enforce_https` is set, since the relay itself never
/// terminates TLS — it always sits behind a proxy that sets the header.
pub async fn enforce_https(
    State(state): State<Arc<RelayState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.enforce_https {
        return next.run(req).await;
    }

    let proto = req.headers().get("x-forwarded-proto").and_then(|v| v.to_str().ok());
    if proto == Some("https") {
        return next.run(req).await;
    }

    let Some(host) = req.headers().get(axum::http::header::HOST).and_then(|v| v.to_str().ok())
    else {
        return next.run(req).await;
    };
    let location = format!("https://{host}{}", req.uri().path_and_query().map_or("", |p| p.as_str()));
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(axum::http::header::LOCATION, location)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
