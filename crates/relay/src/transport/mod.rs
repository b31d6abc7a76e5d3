// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the streaming relay.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::RelayState;

/// Build the axum `Router` with every route from the external HTTP surface.
///
/// Basic auth is attached per-route (mint and register only); CORS and
/// HTTPS enforcement are global layers, matching "all endpoints" and
/// "every publish/subscribe/health request" respectively.
pub fn build_router(state: Arc<RelayState>) -> Router {
    let mint_auth = middleware::from_fn_with_state(state.clone(), auth::require_basic_auth);

    Router::new()
        .route("/streams", post(http::mint_stream).route_layer(mint_auth))
        // PUT/POST/GET share one path (keys may contain slashes, via the
        // catch-all segment); PUT alone checks Basic auth, inline in its
        // handler — a route-scoped layer here would cover all three methods.
        .route(
            "/streams/{*key}",
            put(http::register_stream).post(http::publish).get(http::subscribe),
        )
        .route("/health", get(http::health))
        .layer(middleware::from_fn_with_state(state.clone(), auth::enforce_https))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
