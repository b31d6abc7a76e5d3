// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! busl-relay: stream a writer's byte sequence out to many subscribers.

pub mod config;
pub mod error;
pub mod ids;
pub mod keepalive;
pub mod reader;
pub mod sse;
pub mod state;
pub mod storage;
pub mod substrate;
pub mod transport;
pub mod writer;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{RelayConfig, SubstrateBackend};
use crate::state::RelayState;
use crate::substrate::SubstrateHandle;
use crate::transport::build_router;

/// Run the relay until a shutdown signal arrives.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let substrate = match config.substrate_backend {
        SubstrateBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("REDIS_URL is required when SUBSTRATE_BACKEND=redis"))?;
            let redis = substrate::redis_client::RedisSubstrate::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            SubstrateHandle::Redis(redis)
        }
        SubstrateBackend::Memory => SubstrateHandle::Memory(substrate::memory::MemorySubstrate::new()),
    };

    let storage = storage::StorageBackendClient::new(config.storage_base_url.clone());
    let state = Arc::new(RelayState::new(config, substrate, storage, shutdown.clone()));

    let router = build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "busl-relay listening");

    let shutdown_trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_trigger.cancel();
    });

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
