// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::{self, Stream};

use crate::error::RelayError;
use crate::substrate::{StreamKeys, Subscription, SubstrateEvent, SubstrateHandle};

/// Bound on a single `GETRANGE` so one reader can never pull an unbounded
/// amount of history into memory in one round trip.
const REPLAY_CHUNK_BYTES: i64 = 65_536;

/// A `seek` origin, resolved against a reader's current offset before it is
/// opened. `open` itself only ever takes an absolute offset — callers that
/// need `from_current` semantics (there are none in the HTTP surface today;
/// `Range`/`Last-Event-Id` are both already-absolute byte positions) go
/// through [`resolve_offset`] first.
#[derive(Debug, Clone, Copy)]
pub enum Seek {
    Start(i64),
    Current(i64),
}

/// Apply a `Seek` against `current`, rejecting a negative result.
pub fn resolve_offset(current: i64, seek: Seek) -> Result<i64, RelayError> {
    let offset = match seek {
        Seek::Start(n) => n,
        Seek::Current(n) => current + n,
    };
    if offset < 0 {
        return Err(RelayError::ProtocolBad("negative seek offset".into()));
    }
    Ok(offset)
}

/// The result of opening a reader: whether it should be answered with a
/// bare 204 (no content), and — if not — the byte stream to copy to the
/// response.
pub struct OpenedReader {
    /// `reader_done(reader) && offset >= strlen(data)` at the moment of
    /// opening. When true, `stream` yields nothing and the handler should
    /// not bother consuming it.
    pub no_content: bool,
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>,
}

struct ReaderState {
    substrate: SubstrateHandle,
    keys: StreamKeys,
    offset: i64,
    replayed: bool,
    closed: bool,
    sub: Subscription,
    pending: Option<Bytes>,
}

/// Open a reader for `key` at absolute byte `offset`.
///
/// Subscribes to the stream's pattern BEFORE taking the first replay
/// snapshot — writes that land in the gap between subscribe and replay are
/// still observed, because the reader re-reads `data` on every live
/// wake-up rather than trusting the notification payload.
pub async fn open(
    substrate: SubstrateHandle,
    key: &str,
    offset: i64,
    queue_capacity: usize,
) -> Result<OpenedReader, RelayError> {
    if offset < 0 {
        return Err(RelayError::ProtocolBad("negative offset".into()));
    }
    let keys = StreamKeys::for_stream(key);
    if !substrate.is_registered(&keys).await? {
        return Err(RelayError::NotRegistered);
    }

    let sub = substrate.psubscribe(&keys, queue_capacity).await?;
    let snap = substrate.replay(&keys, offset, offset + REPLAY_CHUNK_BYTES - 1).await?;

    let no_content = snap.done && offset >= snap.total_len;
    let read_to = offset + snap.data.len() as i64;
    let buffered = read_to < snap.total_len;
    let replayed = !buffered || snap.done;
    let immediate_close = snap.data.is_empty() && snap.done;

    let pending = if snap.data.is_empty() { None } else { Some(snap.data) };

    let state = ReaderState {
        substrate,
        keys,
        offset: read_to,
        replayed,
        closed: immediate_close,
        sub,
        pending,
    };

    Ok(OpenedReader { no_content, stream: Box::pin(stream::unfold(state, step)) })
}

async fn step(mut state: ReaderState) -> Option<(Result<Bytes, RelayError>, ReaderState)> {
    loop {
        if let Some(chunk) = state.pending.take() {
            return Some((Ok(chunk), state));
        }
        if state.closed {
            return None;
        }

        if !state.replayed {
            let snap = match state
                .substrate
                .replay(&state.keys, state.offset, state.offset + REPLAY_CHUNK_BYTES - 1)
                .await
            {
                Ok(snap) => snap,
                Err(e) => return Some((Err(e), state)),
            };
            let n = snap.data.len() as i64;
            state.offset += n;
            let buffered = state.offset < snap.total_len;
            state.replayed = !buffered || snap.done;
            if n > 0 {
                return Some((Ok(snap.data), state));
            }
            if snap.done {
                state.closed = true;
                return None;
            }
            continue;
        }

        match state.sub.rx.recv().await {
            Some(SubstrateEvent::Message { channel, .. }) if channel == state.keys.live_channel => {
                state.replayed = false;
                continue;
            }
            Some(SubstrateEvent::Message { channel, .. }) if channel == state.keys.kill_channel => {
                let tail = state.substrate.replay(&state.keys, state.offset, -1).await;
                state.closed = true;
                match tail {
                    Ok(snap) => {
                        state.offset += snap.data.len() as i64;
                        if snap.data.is_empty() {
                            return None;
                        }
                        return Some((Ok(snap.data), state));
                    }
                    Err(e) => return Some((Err(e), state)),
                }
            }
            // A message on some other channel matching the pattern (there
            // are none today beyond live/kill); ignore and keep waiting.
            Some(SubstrateEvent::Message { .. }) => continue,
            Some(SubstrateEvent::Ended) | None => {
                state.closed = true;
                return None;
            }
        }
    }
}
