// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rand::RngCore;

/// Mint a new stream id: 128 bits of randomness, hex-encoded to 32 characters.
///
/// Ids are opaque to the relay itself — they only need to be unguessable and
/// safe to embed in a URL path segment.
pub fn new_stream_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(32);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
