// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};

use crate::error::RelayError;

/// Re-encode a raw byte stream as Server-Sent Events.
///
/// Each non-empty chunk from `inner` becomes one frame: `id:` set to the
/// absolute byte offset immediately after the chunk, followed by one
/// `data:` line per `\n`-separated line in the chunk (a trailing newline in
/// the chunk produces a trailing empty `data:` line), then a blank line.
/// `start_offset` is whatever the reader was seeked to — the encoder never
/// re-reads or re-seeks the inner stream itself, it only tracks the running
/// offset so `id:` stays correct.
pub fn encode<S>(
    inner: S,
    start_offset: i64,
) -> impl Stream<Item = Result<Bytes, RelayError>>
where
    S: Stream<Item = Result<Bytes, RelayError>> + Send + 'static,
{
    stream::unfold((Box::pin(inner), start_offset), |(mut inner, offset)| async move {
        loop {
            return match inner.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    let new_offset = offset + chunk.len() as i64;
                    Some((Ok(Bytes::from(format_frame(new_offset, &chunk))), (inner, new_offset)))
                }
                Some(Err(e)) => Some((Err(e), (inner, offset))),
                None => None,
            };
        }
    })
}

fn format_frame(id: i64, chunk: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(chunk);
    let mut out = format!("id: {id}\n");
    for line in text.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_splits_on_newline_with_trailing_empty_line() {
        let chunks: Vec<Result<Bytes, RelayError>> = vec![Ok(Bytes::from_static(b"ello\nworld\n"))];
        let s = encode(stream::iter(chunks), 1);
        let out: Vec<_> = s.collect().await;
        assert_eq!(out.len(), 1);
        let frame = out.into_iter().next().unwrap().unwrap();
        assert_eq!(frame, Bytes::from_static(b"id: 12\ndata: ello\ndata: world\ndata: \n\n"));
    }

    #[tokio::test]
    async fn id_tracks_cumulative_offset_across_chunks() {
        let chunks: Vec<Result<Bytes, RelayError>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let s = encode(stream::iter(chunks), 0);
        let out: Vec<_> = s.collect().await;
        let ids: Vec<i64> = out
            .iter()
            .map(|f| {
                let text = String::from_utf8_lossy(f.as_ref().unwrap());
                text.lines().next().unwrap().trim_start_matches("id: ").parse().unwrap()
            })
            .collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let chunks: Vec<Result<Bytes, RelayError>> =
            vec![Ok(Bytes::new()), Ok(Bytes::from_static(b"hi"))];
        let s = encode(stream::iter(chunks), 0);
        let out: Vec<_> = s.collect().await;
        assert_eq!(out.len(), 1);
    }
}
