// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the streaming relay.

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::warn;

use crate::error::RelayError;
use crate::substrate::StreamKeys;
use crate::state::RelayState;
use crate::{ids, keepalive, reader, sse, writer};

const GRAVESTONE: &str = "\
    .-.\n\
   (RIP)\n\
   |   |\n\
   | ? |  no such stream\n\
  _|___|_\n";

/// `POST /streams` — mint a new random stream id and register it.
pub async fn mint_stream(State(state): State<Arc<RelayState>>) -> Response {
    let id = ids::new_stream_id();
    let keys = StreamKeys::for_stream(&id);
    match state.substrate.register(&keys, state.config.data_ttl()).await {
        Ok(()) => (StatusCode::OK, id).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to register new stream");
            (StatusCode::SERVICE_UNAVAILABLE, "could not create stream").into_response()
        }
    }
}

/// `PUT /streams/{*key}` — register a caller-chosen stream id.
///
/// Shares its path with `POST`/`GET /streams/{*key}`, so Basic auth is
/// checked inline here rather than through a route-scoped middleware layer
/// (which would apply to all three methods on the shared path).
pub async fn register_stream(
    State(state): State<Arc<RelayState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(code) = crate::transport::auth::validate_basic(&headers, &state.config.credential_pairs())
    {
        state.counters.auth_rejections.fetch_add(1, Ordering::Relaxed);
        return code.to_http_response("unauthorized").into_response();
    }
    let keys = StreamKeys::for_stream(&key);
    match state.substrate.register(&keys, state.config.data_ttl()).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => {
            warn!(error = %e, key = %key, "failed to register stream");
            (StatusCode::SERVICE_UNAVAILABLE, "could not register stream").into_response()
        }
    }
}

/// `POST /streams/{*key}` — publish bytes onto a registered stream. Requires
/// chunked transfer encoding; copies the request body into the writer as it
/// arrives and, once the body ends, kicks off an async cold-storage upload
/// if one is configured.
pub async fn publish(
    State(state): State<Arc<RelayState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Body,
) -> Response {
    let chunked = headers
        .get(axum::http::header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);
    if !chunked {
        return RelayError::ProtocolBad("Transfer-Encoding: chunked required".into())
            .to_http_response("chunked transfer encoding required")
            .into_response();
    }

    let sw = match writer::StreamWriter::open(
        state.substrate.clone(),
        &key,
        state.config.data_ttl(),
        state.config.done_ttl(),
    )
    .await
    {
        Ok(w) => w,
        Err(RelayError::NotRegistered) => {
            state.counters.registrar_misses.fetch_add(1, Ordering::Relaxed);
            return RelayError::NotRegistered.to_http_response("stream not registered").into_response();
        }
        Err(e) => return e.to_http_response(e.to_string()).into_response(),
    };

    let mut body_stream = body.into_data_stream();
    loop {
        match tokio::time::timeout(state.config.http_read_timeout(), body_stream.next()).await {
            Ok(Some(Ok(chunk))) => {
                if let Err(e) = sw.write(&chunk).await {
                    warn!(error = %e, key = %key, "write to substrate failed");
                    return e.to_http_response(e.to_string()).into_response();
                }
            }
            Ok(Some(Err(e))) => {
                // A body error this late is almost always the producer
                // disconnecting mid-stream; there's nothing useful to retry.
                warn!(error = %e, key = %key, "publish body ended early");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                state.counters.substrate_transient_errors.fetch_add(1, Ordering::Relaxed);
                return RelayError::Transient("read timeout".into())
                    .to_http_response("publish read timed out")
                    .into_response();
            }
        }
    }

    if state.storage.is_configured() {
        let storage = state.storage.clone();
        let substrate = state.substrate.clone();
        let keys = StreamKeys::for_stream(&key);
        let key_owned = key.clone();
        tokio::spawn(async move {
            match substrate.replay(&keys, 0, -1).await {
                Ok(snap) => {
                    if let Err(e) = storage.put(&key_owned, query.as_deref(), snap.data).await {
                        warn!(error = %e, key = %key_owned, "async storage upload failed");
                    }
                }
                Err(e) => warn!(error = %e, key = %key_owned, "could not read buffer for storage upload"),
            }
        });
    }

    StatusCode::OK.into_response()
}

/// `GET /streams/{*key}` — subscribe. Resolves against the substrate first,
/// falling back to cold storage per the reader resolution strategy.
pub async fn subscribe(
    State(state): State<Arc<RelayState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let offset = parse_offset(&headers);
    let is_sse = accepts_sse(&headers);

    match reader::open(state.substrate.clone(), &key, offset, state.config.reader_queue_capacity).await
    {
        Ok(opened) => {
            if opened.no_content {
                return StatusCode::NO_CONTENT.into_response();
            }
            respond_with_stream(&state, opened.stream, offset, is_sse)
        }
        Err(RelayError::NotRegistered) => {
            state.counters.registrar_misses.fetch_add(1, Ordering::Relaxed);
            fall_back_to_storage(&state, &key, offset, &headers).await
        }
        Err(e) => e.to_http_response(e.to_string()).into_response(),
    }
}

/// `GET /health` — plain-text `OK`, or a JSON counters payload for
/// operational visibility when the caller asks for it.
pub async fn health(State(state): State<Arc<RelayState>>, headers: HeaderMap) -> Response {
    let wants_json = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    if wants_json {
        Json(state.counters.snapshot()).into_response()
    } else {
        (StatusCode::OK, "OK").into_response()
    }
}

fn accepts_sse(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

/// `Last-Event-Id` takes precedence over `Range: bytes=n-`; both are
/// absolute byte offsets. Anything unparsable defaults to 0.
fn parse_offset(headers: &HeaderMap) -> i64 {
    if let Some(v) = headers.get("last-event-id").and_then(|v| v.to_str().ok()) {
        if let Ok(n) = v.trim().parse::<i64>() {
            return n.max(0);
        }
    }
    if let Some(v) = headers.get(axum::http::header::RANGE).and_then(|v| v.to_str().ok()) {
        if let Some(rest) = v.strip_prefix("bytes=") {
            if let Ok(n) = rest.trim_end_matches('-').parse::<i64>() {
                return n.max(0);
            }
        }
    }
    0
}

async fn fall_back_to_storage(
    state: &RelayState,
    key: &str,
    offset: i64,
    headers: &HeaderMap,
) -> Response {
    if !state.storage.is_configured() {
        return not_found_response(headers);
    }
    match state.storage.get(key, offset).await {
        Ok(stream) => {
            let body = Body::from_stream(stream);
            Response::builder()
                .status(StatusCode::OK)
                .header(axum::http::header::CONTENT_TYPE, "application/octet-stream")
                .body(body)
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(RelayError::Range) => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
        Err(RelayError::StorageNotFound) | Err(RelayError::NoStorage) => not_found_response(headers),
        Err(e) => e.to_http_response(e.to_string()).into_response(),
    }
}

fn not_found_response(headers: &HeaderMap) -> Response {
    let wants_gravestone = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "text/ascii; version=feral")
        .unwrap_or(false);
    if wants_gravestone {
        (StatusCode::NOT_FOUND, GRAVESTONE).into_response()
    } else {
        RelayError::NotRegistered.to_http_response("stream not found").into_response()
    }
}

fn respond_with_stream(
    state: &RelayState,
    stream: Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>,
    offset: i64,
    is_sse: bool,
) -> Response {
    let content_type = if is_sse { "text/event-stream" } else { "application/octet-stream" };
    let heartbeat = keepalive::heartbeat_packet(is_sse);
    let shaped: Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>> =
        if is_sse { Box::pin(sse::encode(stream, offset)) } else { stream };
    // A child token: cancelling it (via `State::drop` in `keepalive.rs`, on
    // early client disconnect) never propagates back up to `state.shutdown`,
    // but a process-wide shutdown still cancels every outstanding subscriber.
    let kept_alive = keepalive::wrap(
        shaped,
        state.config.heartbeat_interval(),
        heartbeat,
        state.shutdown.child_token(),
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, content_type)
        .header(axum::http::header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(kept_alive))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
