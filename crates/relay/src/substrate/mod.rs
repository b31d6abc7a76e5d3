// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The substrate is the relay's shared, TTL'd key/value + pub-sub store.
//!
//! In production this is Redis ([`redis_client::RedisSubstrate`]); for tests
//! and the end-to-end harness it is an in-process stand-in
//! ([`memory::MemorySubstrate`]). [`SubstrateHandle`] is the concrete enum
//! the rest of the relay holds — callers never match on it themselves, they
//! just call its methods.

pub mod memory;
pub mod redis_client;

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

/// The five keys derived from a stream id. Every component that touches the
/// substrate goes through this rather than formatting key strings itself.
#[derive(Debug, Clone)]
pub struct StreamKeys {
    pub data: String,
    pub done: String,
    pub kill_channel: String,
    pub live_channel: String,
    pub pattern: String,
}

impl StreamKeys {
    pub fn for_stream(id: &str) -> Self {
        Self {
            data: id.to_owned(),
            done: format!("{id}:done"),
            kill_channel: format!("{id}:kill"),
            live_channel: format!("{id}:live"),
            pattern: format!("{id}:*"),
        }
    }
}

/// Result of a replay read: the slice of data in range, the stream's total
/// length at read time, and whether the writer has closed the stream.
#[derive(Debug, Clone)]
pub struct ReplaySnapshot {
    pub data: Bytes,
    pub total_len: i64,
    pub done: bool,
}

/// An event delivered on a pattern subscription.
#[derive(Debug, Clone)]
pub enum SubstrateEvent {
    /// A message published on a channel matching the subscribed pattern.
    Message { channel: String, payload: Bytes },
    /// The subscription itself ended (substrate connection dropped, or the
    /// subscribe task was cancelled).
    Ended,
}

/// A live handle to a pattern subscription.
///
/// Dropping this (or cancelling it explicitly) stops the background task
/// that forwards messages into the bounded channel.
pub struct Subscription {
    pub rx: mpsc::Receiver<SubstrateEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<SubstrateEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The substrate operations the relay core needs, grouped the way the
/// writer and reader actually call them (single atomic round trips rather
/// than individual commands) so a fake substrate can be held to the same
/// contract as Redis without reimplementing transactional semantics.
#[derive(Clone)]
pub enum SubstrateHandle {
    Redis(redis_client::RedisSubstrate),
    Memory(memory::MemorySubstrate),
}

impl SubstrateHandle {
    /// Create the `data` key with an empty value and TTL, so that
    /// `is_registered` becomes true. No-op if it already exists.
    pub async fn register(&self, keys: &StreamKeys, ttl: Duration) -> Result<(), RelayError> {
        match self {
            Self::Redis(s) => s.register(keys, ttl).await,
            Self::Memory(s) => s.register(keys, ttl).await,
        }
    }

    pub async fn is_registered(&self, keys: &StreamKeys) -> Result<bool, RelayError> {
        match self {
            Self::Redis(s) => s.is_registered(keys).await,
            Self::Memory(s) => s.is_registered(keys).await,
        }
    }

    /// APPEND the chunk, refresh the `data` TTL, clear any stale `done`
    /// sentinel, and publish on the live channel — one round trip.
    pub async fn write_append(
        &self,
        keys: &StreamKeys,
        chunk: &[u8],
        data_ttl: Duration,
    ) -> Result<i64, RelayError> {
        match self {
            Self::Redis(s) => s.write_append(keys, chunk, data_ttl).await,
            Self::Memory(s) => s.write_append(keys, chunk, data_ttl).await,
        }
    }

    /// Refresh the `data` TTL, set the `done` sentinel, and publish on the
    /// kill channel — one round trip.
    pub async fn write_close(
        &self,
        keys: &StreamKeys,
        data_ttl: Duration,
        done_ttl: Duration,
    ) -> Result<(), RelayError> {
        match self {
            Self::Redis(s) => s.write_close(keys, data_ttl, done_ttl).await,
            Self::Memory(s) => s.write_close(keys, data_ttl, done_ttl).await,
        }
    }

    /// GETRANGE + STRLEN + EXISTS(done), read together so the three numbers
    /// describe one consistent instant.
    pub async fn replay(
        &self,
        keys: &StreamKeys,
        start: i64,
        end: i64,
    ) -> Result<ReplaySnapshot, RelayError> {
        match self {
            Self::Redis(s) => s.replay(keys, start, end).await,
            Self::Memory(s) => s.replay(keys, start, end).await,
        }
    }

    /// Subscribe to `keys.pattern`, returning a handle whose receiver yields
    /// messages published on `keys.live_channel` and `keys.kill_channel`.
    pub async fn psubscribe(
        &self,
        keys: &StreamKeys,
        queue_capacity: usize,
    ) -> Result<Subscription, RelayError> {
        match self {
            Self::Redis(s) => s.psubscribe(keys, queue_capacity).await,
            Self::Memory(s) => s.psubscribe(keys, queue_capacity).await,
        }
    }
}
