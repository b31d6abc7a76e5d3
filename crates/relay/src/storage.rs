// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::warn;

use crate::error::RelayError;

const MAX_RETRIES: u32 = 3;

/// Client for the optional cold-storage backend: a plain HTTP object store
/// reached at `<base_url>/<key>`.
///
/// One `reqwest::Client` is shared process-wide; "fresh connections" on
/// retry is satisfied by issuing a brand new request per attempt rather than
/// resuming a half-read response, since `reqwest` already pools the
/// underlying TCP/TLS connections for us.
#[derive(Clone)]
pub struct StorageBackendClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl StorageBackendClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn url_for(&self, key: &str, query: Option<&str>) -> Result<String, RelayError> {
        let base = self.base_url.as_deref().ok_or(RelayError::NoStorage)?;
        let base = base.trim_end_matches('/');
        match query {
            Some(q) if !q.is_empty() => Ok(format!("{base}/{key}?{q}")),
            _ => Ok(format!("{base}/{key}")),
        }
    }

    /// PUT `body` to `<base_url>/<key>[?query]`. Retries up to
    /// [`MAX_RETRIES`] times on a 5xx response; any other failure (4xx,
    /// network error) fails immediately.
    pub async fn put(&self, key: &str, query: Option<&str>, body: Bytes) -> Result<(), RelayError> {
        let url = self.url_for(key, query)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.http.put(&url).body(body.clone()).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_RETRIES => {
                    warn!(url = %url, status = %resp.status(), attempt, "storage PUT 5xx, retrying");
                    continue;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    return Err(RelayError::Transient(format!("storage PUT exhausted retries: {}", resp.status())));
                }
                Ok(resp) => {
                    return Err(RelayError::Internal(format!("storage PUT non-2xx: {}", resp.status())));
                }
                Err(e) if attempt < MAX_RETRIES && e.is_timeout() => {
                    warn!(url = %url, attempt, "storage PUT timeout, retrying");
                    continue;
                }
                Err(e) => return Err(RelayError::Transient(format!("storage PUT: {e}"))),
            }
        }
    }

    /// GET `<base_url>/<key>` with `Range: bytes=<offset>-`, returning the
    /// response body as a byte stream shaped like [`crate::reader`]'s
    /// output, so the handler treats a cold read identically to a live one.
    pub async fn get(
        &self,
        key: &str,
        offset: i64,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>, RelayError> {
        let url = self.url_for(key, None)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result =
                self.http.get(&url).header("Range", format!("bytes={offset}-")).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    let stream = resp.bytes_stream().map(|r| r.map_err(|e| RelayError::Transient(e.to_string())));
                    return Ok(Box::pin(stream));
                }
                Ok(resp) if resp.status().as_u16() == 416 => return Err(RelayError::Range),
                Ok(resp) if resp.status().as_u16() == 404 || resp.status().as_u16() == 403 => {
                    return Err(RelayError::StorageNotFound);
                }
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_RETRIES => {
                    warn!(url = %url, status = %resp.status(), attempt, "storage GET 5xx, retrying");
                    continue;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    return Err(RelayError::Transient(format!("storage GET exhausted retries: {}", resp.status())));
                }
                Ok(resp) => {
                    return Err(RelayError::Internal(format!("storage GET non-2xx: {}", resp.status())));
                }
                Err(e) if attempt < MAX_RETRIES && e.is_timeout() => {
                    warn!(url = %url, attempt, "storage GET timeout, retrying");
                    continue;
                }
                Err(e) => return Err(RelayError::Transient(format!("storage GET: {e}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_base_url_is_unconfigured() {
        let client = StorageBackendClient::new(None);
        assert!(!client.is_configured());
        assert_eq!(client.url_for("k", None).unwrap_err(), RelayError::NoStorage);
    }

    #[test]
    fn url_joins_query_string() {
        let client = StorageBackendClient::new(Some("https://sb.example".into()));
        assert_eq!(client.url_for("k/sub", None).unwrap(), "https://sb.example/k/sub");
        assert_eq!(
            client.url_for("k", Some("sig=abc")).unwrap(),
            "https://sb.example/k?sig=abc"
        );
    }
}
