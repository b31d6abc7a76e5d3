// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

/// The plain-stream heartbeat: a single NUL byte.
pub const HEARTBEAT_PLAIN: &[u8] = &[0u8];
/// The SSE heartbeat: a comment line, ignored by any conforming client.
pub const HEARTBEAT_SSE: &[u8] = b":keepalive\n";

pub fn heartbeat_packet(is_sse: bool) -> Bytes {
    if is_sse {
        Bytes::from_static(HEARTBEAT_SSE)
    } else {
        Bytes::from_static(HEARTBEAT_PLAIN)
    }
}

/// Wrap `inner` so that an idle period longer than `heartbeat_interval`
/// injects `heartbeat` into the output, and cancelling `cancel` ends the
/// stream as if `inner` had reached EOF.
///
/// `cancel` must be a token scoped to this one subscriber (a
/// [`CancellationToken::child_token`] of the process-wide shutdown token,
/// not that token itself) — when the caller drops the returned stream
/// (client disconnected mid-response), `State`'s `Drop` cancels it, which
/// wakes the forwarding task out of its `inner.next()` wait immediately
/// instead of leaving it parked until `inner` next yields on its own. The
/// forwarding task also exits on its own if the returned stream is merely
/// dropped without anyone cancelling — the `WeakSender` stops upgrading —
/// but that only happens after `inner` yields again, which can be never for
/// a subscriber parked on a live pub-sub wait. Cancellation closes that gap.
pub fn wrap<S>(
    inner: S,
    heartbeat_interval: Duration,
    heartbeat: Bytes,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, RelayError>>
where
    S: Stream<Item = Result<Bytes, RelayError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<Bytes, RelayError>>(1);
    let weak = tx.downgrade();
    let forward_cancel = cancel.clone();

    tokio::spawn(async move {
        let mut inner = Box::pin(inner);
        loop {
            tokio::select! {
                biased;
                _ = forward_cancel.cancelled() => break,
                item = inner.next() => {
                    let Some(item) = item else { break };
                    let Some(tx) = weak.upgrade() else { break };
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut interval = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = State { rx, _tx: tx, interval, heartbeat, cancel, done: false };
    stream::unfold(state, step)
}

struct State {
    rx: mpsc::Receiver<Result<Bytes, RelayError>>,
    // Held only so the spawned task's WeakSender stays upgradeable for as
    // long as this stream is alive; never sent on directly.
    _tx: mpsc::Sender<Result<Bytes, RelayError>>,
    interval: tokio::time::Interval,
    heartbeat: Bytes,
    cancel: CancellationToken,
    done: bool,
}

impl Drop for State {
    // Fires on early client disconnect (the response body is dropped before
    // EOF). Wakes the forwarding task out of its `inner.next()` wait so it
    // unwinds the reader chain — and with it the substrate subscription —
    // right away instead of leaking until `inner` happens to yield again.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn step(mut state: State) -> Option<(Result<Bytes, RelayError>, State)> {
    if state.done {
        return None;
    }
    tokio::select! {
        biased;
        _ = state.cancel.cancelled() => {
            state.done = true;
            None
        }
        item = state.rx.recv() => {
            match item {
                Some(item) => Some((item, state)),
                None => {
                    state.done = true;
                    None
                }
            }
        }
        _ = state.interval.tick() => {
            let hb = state.heartbeat.clone();
            Some((Ok(hb), state))
        }
    }
}
