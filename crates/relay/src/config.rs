// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Which substrate backend to talk to.
///
/// `Memory` exists for tests and the end-to-end harness: it behaves
/// identically to `Redis` from the relay core's point of view (same
/// [`crate::substrate::Substrate`] trait) but keeps no external process
/// alive. Production deployments always use `Redis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum SubstrateBackend {
    Redis,
    Memory,
}

/// Configuration for the busl-relay server.
///
/// Every field here mirrors an "Environment / configuration" entry from the
/// specification; flags take precedence over the matching environment
/// variable. Constructed once in `main` and passed down as an immutable,
/// cloneable record — never read again from the environment after startup.
#[derive(Debug, Clone, Parser)]
#[command(name = "busl-relay", about = "Streaming relay: fan out a writer's byte stream to subscribers")]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// TCP port to bind.
    #[arg(long, default_value_t = 5000, env = "PORT")]
    pub port: u16,

    /// Redis (or substrate-equivalent) connection URL, e.g. redis://:pass@host:6379.
    #[arg(long, env = "REDIS_URL", required_unless_present = "substrate_backend")]
    pub redis_url: Option<String>,

    /// Which substrate backend to use. `memory` is test/dev-only.
    #[arg(long, value_enum, default_value_t = SubstrateBackend::Redis, env = "SUBSTRATE_BACKEND")]
    pub substrate_backend: SubstrateBackend,

    /// Optional base URL of an object-storage backend for cold replay and
    /// archival after substrate TTL expiry.
    #[arg(long, env = "STORAGE_BASE_URL")]
    pub storage_base_url: Option<String>,

    /// Basic-auth credential store: `user:pass|user:pass|...`. If unset,
    /// write endpoints are unauthenticated.
    #[arg(long, env = "CREDS")]
    pub creds: Option<String>,

    /// Enforce HTTPS by 301-redirecting requests whose `X-Forwarded-Proto`
    /// is not `https`.
    #[arg(long, default_value_t = false, env = "ENFORCE_HTTPS")]
    pub enforce_https: bool,

    /// Heartbeat interval, in milliseconds, injected into idle subscriber streams.
    #[arg(long, default_value_t = 10_000, env = "HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: u64,

    /// Per-request HTTP read timeout, in milliseconds.
    #[arg(long, default_value_t = 3_600_000, env = "HTTP_READ_TIMEOUT_MS")]
    pub http_read_timeout_ms: u64,

    /// Per-request HTTP write timeout, in milliseconds.
    #[arg(long, default_value_t = 3_600_000, env = "HTTP_WRITE_TIMEOUT_MS")]
    pub http_write_timeout_ms: u64,

    /// TTL, in seconds, applied to the `data` key on every write and read.
    #[arg(long, default_value_t = 3600, env = "DATA_TTL_SECS")]
    pub data_ttl_secs: u64,

    /// TTL, in seconds, applied to the `done` sentinel on close.
    #[arg(long, default_value_t = 60, env = "DONE_TTL_SECS")]
    pub done_ttl_secs: u64,

    /// Capacity of the bounded channel between a reader's pub-sub receive
    /// task and its consumer.
    #[arg(long, default_value_t = 100, env = "READER_QUEUE_CAPACITY")]
    pub reader_queue_capacity: usize,

    /// Log output format.
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: String,

    /// Log level filter (passed to `tracing_subscriber::EnvFilter` when `RUST_LOG` is unset).
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl RelayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn http_read_timeout(&self) -> Duration {
        Duration::from_millis(self.http_read_timeout_ms)
    }

    pub fn http_write_timeout(&self) -> Duration {
        Duration::from_millis(self.http_write_timeout_ms)
    }

    pub fn data_ttl(&self) -> Duration {
        Duration::from_secs(self.data_ttl_secs)
    }

    pub fn done_ttl(&self) -> Duration {
        Duration::from_secs(self.done_ttl_secs)
    }

    /// Parse the `user:pass|user:pass|...` credential store into pairs.
    pub fn credential_pairs(&self) -> Vec<(String, String)> {
        let Some(ref creds) = self.creds else { return Vec::new() };
        creds
            .split('|')
            .filter_map(|pair| pair.split_once(':'))
            .map(|(u, p)| (u.to_owned(), p.to_owned()))
            .collect()
    }
}
