// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ReplaySnapshot, StreamKeys, Subscription, SubstrateEvent};
use crate::error::RelayError;

/// Redis-backed substrate. Holds a pooled [`ConnectionManager`] for the
/// request/response path (reused across every call) and a plain
/// [`redis::Client`] to mint a dedicated pub-sub connection per
/// subscription, since pub-sub takes over a connection for its lifetime.
#[derive(Clone)]
pub struct RedisSubstrate {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisSubstrate {
    pub async fn connect(url: &str) -> Result<Self, RelayError> {
        let client = redis::Client::open(url)
            .map_err(|e| RelayError::Internal(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| RelayError::Transient(format!("redis connect: {e}")))?;
        Ok(Self { client, conn })
    }

    pub async fn register(&self, keys: &StreamKeys, ttl: Duration) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs() as i64;
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&keys.data)
            .arg("")
            .arg("NX")
            .ignore()
            .expire(&keys.data, ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(transient)?;
        Ok(())
    }

    pub async fn is_registered(&self, keys: &StreamKeys) -> Result<bool, RelayError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(&keys.data).await.map_err(transient)?;
        Ok(exists)
    }

    pub async fn write_append(
        &self,
        keys: &StreamKeys,
        chunk: &[u8],
        data_ttl: Duration,
    ) -> Result<i64, RelayError> {
        let mut conn = self.conn.clone();
        let ttl_secs = data_ttl.as_secs() as i64;
        let (new_len,): (i64,) = redis::pipe()
            .atomic()
            .append(&keys.data, chunk)
            .expire(&keys.data, ttl_secs)
            .ignore()
            .del(&keys.done)
            .ignore()
            .publish(&keys.live_channel, "1")
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(transient)?;
        Ok(new_len)
    }

    pub async fn write_close(
        &self,
        keys: &StreamKeys,
        data_ttl: Duration,
        done_ttl: Duration,
    ) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let data_ttl_secs = data_ttl.as_secs() as i64;
        let done_ttl_secs = done_ttl.as_secs() as u64;
        redis::pipe()
            .atomic()
            .expire(&keys.data, data_ttl_secs)
            .ignore()
            .set_ex(&keys.done, "1", done_ttl_secs)
            .ignore()
            .publish(&keys.kill_channel, "1")
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(transient)?;
        Ok(())
    }

    pub async fn replay(
        &self,
        keys: &StreamKeys,
        start: i64,
        end: i64,
    ) -> Result<ReplaySnapshot, RelayError> {
        let mut conn = self.conn.clone();
        let (data, total_len, done): (Vec<u8>, i64, bool) = redis::pipe()
            .atomic()
            .getrange(&keys.data, start, end)
            .strlen(&keys.data)
            .exists(&keys.done)
            .query_async(&mut conn)
            .await
            .map_err(transient)?;
        Ok(ReplaySnapshot { data: Bytes::from(data), total_len, done })
    }

    pub async fn psubscribe(
        &self,
        keys: &StreamKeys,
        queue_capacity: usize,
    ) -> Result<Subscription, RelayError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| RelayError::Transient(format!("redis pubsub connect: {e}")))?;
        pubsub.psubscribe(&keys.pattern).await.map_err(transient)?;

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let pattern = keys.pattern.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!(pattern = %pattern, "pubsub subscription cancelled");
                        break;
                    }
                    msg = stream.next() => {
                        let Some(msg) = msg else {
                            let _ = tx.send(SubstrateEvent::Ended).await;
                            break;
                        };
                        let channel: String = msg.get_channel_name().to_owned();
                        let payload: Vec<u8> = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "failed to decode pubsub payload");
                                continue;
                            }
                        };
                        if tx
                            .send(SubstrateEvent::Message { channel, payload: Bytes::from(payload) })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, cancel))
    }
}

fn transient(e: redis::RedisError) -> RelayError {
    RelayError::Transient(e.to_string())
}
