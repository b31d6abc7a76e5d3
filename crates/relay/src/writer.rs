// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::error::RelayError;
use crate::substrate::{StreamKeys, SubstrateHandle};

/// A handle to an open stream, bound to one writer.
///
/// `new` requires the stream to already be registered; every other field is
/// just the TTL pair applied on each write/close.
pub struct StreamWriter {
    substrate: SubstrateHandle,
    keys: StreamKeys,
    data_ttl: Duration,
    done_ttl: Duration,
}

impl StreamWriter {
    /// Open a writer for `key`. Fails with [`RelayError::NotRegistered`] if
    /// the stream's data key is not currently present in the substrate —
    /// including the race where a registration just expired.
    pub async fn open(
        substrate: SubstrateHandle,
        key: &str,
        data_ttl: Duration,
        done_ttl: Duration,
    ) -> Result<Self, RelayError> {
        let keys = StreamKeys::for_stream(key);
        if !substrate.is_registered(&keys).await? {
            return Err(RelayError::NotRegistered);
        }
        Ok(Self { substrate, keys, data_ttl, done_ttl })
    }

    /// Append `chunk`, refresh the data TTL, clear a stale done sentinel,
    /// and wake any subscribers. Returns the number of bytes written — on
    /// success this is always `chunk.len()`; there is no partial write.
    pub async fn write(&self, chunk: &[u8]) -> Result<usize, RelayError> {
        self.substrate.write_append(&self.keys, chunk, self.data_ttl).await?;
        Ok(chunk.len())
    }

    /// Mark the stream done and wake subscribers on the kill channel.
    /// Idempotent: closing an already-closed stream is harmless.
    pub async fn close(&self) -> Result<(), RelayError> {
        self.substrate.write_close(&self.keys, self.data_ttl, self.done_ttl).await
    }
}
