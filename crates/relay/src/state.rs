// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::storage::StorageBackendClient;
use crate::substrate::SubstrateHandle;

/// Shared relay state, built once in [`crate::run`] and handed to every
/// handler behind an `Arc`.
pub struct RelayState {
    pub config: RelayConfig,
    pub substrate: SubstrateHandle,
    pub storage: StorageBackendClient,
    pub shutdown: CancellationToken,
    pub counters: Counters,
}

impl RelayState {
    pub fn new(
        config: RelayConfig,
        substrate: SubstrateHandle,
        storage: StorageBackendClient,
        shutdown: CancellationToken,
    ) -> Self {
        Self { config, substrate, storage, shutdown, counters: Counters::default() }
    }
}

/// Diagnostic counters surfaced through `GET /health` when the caller asks
/// for JSON. These back operational logging, not an exported metrics
/// format — there is no scrape endpoint or label cardinality to manage.
#[derive(Default)]
pub struct Counters {
    pub registrar_misses: AtomicU64,
    pub substrate_transient_errors: AtomicU64,
    pub sb_retries_exhausted: AtomicU64,
    pub auth_rejections: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            registrar_misses: self.registrar_misses.load(Ordering::Relaxed),
            substrate_transient_errors: self.substrate_transient_errors.load(Ordering::Relaxed),
            sb_retries_exhausted: self.sb_retries_exhausted.load(Ordering::Relaxed),
            auth_rejections: self.auth_rejections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CountersSnapshot {
    pub registrar_misses: u64,
    pub substrate_transient_errors: u64,
    pub sb_retries_exhausted: u64,
    pub auth_rejections: u64,
}
