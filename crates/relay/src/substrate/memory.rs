// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{ReplaySnapshot, StreamKeys, Subscription, SubstrateEvent};
use crate::error::RelayError;

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    done: HashMap<String, bool>,
}

/// An in-process stand-in for Redis.
///
/// Keeps stream bytes and done-flags in a `Mutex`-guarded map and fans
/// publishes out through a single broadcast channel, filtering by pattern on
/// the subscriber side — exactly what `PSUBSCRIBE k:*` does, just without a
/// server. TTLs are accepted but not enforced: nothing in the relay's own
/// test suite or the end-to-end harness runs long enough to need expiry, and
/// simulating it would mean running a clock no test controls.
#[derive(Clone)]
pub struct MemorySubstrate {
    inner: Arc<Mutex<Inner>>,
    channel: broadcast::Sender<(String, Bytes)>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        let (channel, _rx) = broadcast::channel(1024);
        Self { inner: Arc::new(Mutex::new(Inner::default())), channel }
    }

    pub async fn register(&self, keys: &StreamKeys, _ttl: Duration) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;
        inner.data.entry(keys.data.clone()).or_default();
        Ok(())
    }

    pub async fn is_registered(&self, keys: &StreamKeys) -> Result<bool, RelayError> {
        let inner = self.inner.lock().await;
        Ok(inner.data.contains_key(&keys.data))
    }

    pub async fn write_append(
        &self,
        keys: &StreamKeys,
        chunk: &[u8],
        _data_ttl: Duration,
    ) -> Result<i64, RelayError> {
        let new_len = {
            let mut inner = self.inner.lock().await;
            let buf = inner.data.entry(keys.data.clone()).or_default();
            buf.extend_from_slice(chunk);
            inner.done.remove(&keys.done);
            inner.data.get(&keys.data).map(Vec::len).unwrap_or(0) as i64
        };
        let _ = self.channel.send((keys.live_channel.clone(), Bytes::from_static(b"1")));
        Ok(new_len)
    }

    pub async fn write_close(
        &self,
        keys: &StreamKeys,
        _data_ttl: Duration,
        _done_ttl: Duration,
    ) -> Result<(), RelayError> {
        {
            let mut inner = self.inner.lock().await;
            inner.done.insert(keys.done.clone(), true);
        }
        let _ = self.channel.send((keys.kill_channel.clone(), Bytes::from_static(b"1")));
        Ok(())
    }

    pub async fn replay(
        &self,
        keys: &StreamKeys,
        start: i64,
        end: i64,
    ) -> Result<ReplaySnapshot, RelayError> {
        let inner = self.inner.lock().await;
        let buf = inner.data.get(&keys.data).map(Vec::as_slice).unwrap_or(&[]);
        let total_len = buf.len() as i64;
        let done = inner.done.contains_key(&keys.done);
        let data = slice_redis_range(buf, start, end);
        Ok(ReplaySnapshot { data: Bytes::copy_from_slice(data), total_len, done })
    }

    pub async fn psubscribe(
        &self,
        keys: &StreamKeys,
        queue_capacity: usize,
    ) -> Result<Subscription, RelayError> {
        let prefix = keys.pattern.trim_end_matches('*').to_owned();
        let mut source = self.channel.subscribe();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    msg = source.recv() => {
                        match msg {
                            Ok((channel, payload)) if channel.starts_with(&prefix) => {
                                if tx.send(SubstrateEvent::Message { channel, payload }).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => continue,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => {
                                let _ = tx.send(SubstrateEvent::Ended).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, cancel))
    }
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply Redis's `GETRANGE` index semantics: negative indices count from the
/// end, both bounds are inclusive, and out-of-range bounds clamp rather than
/// error.
fn slice_redis_range(buf: &[u8], start: i64, end: i64) -> &[u8] {
    if buf.is_empty() {
        return &[];
    }
    let len = buf.len() as i64;
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (len + i).max(0)
        } else {
            i
        }
    };
    let start = norm(start).min(len);
    let end = norm(end).min(len - 1);
    if start > end || start >= len {
        return &[];
    }
    &buf[start as usize..=end as usize]
}
