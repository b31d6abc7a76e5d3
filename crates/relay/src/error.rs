// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the relay API and core components.
///
/// Every fallible operation in `substrate`, `registrar`, `writer`, `reader`,
/// and `storage` returns one of these; the transport layer is the single
/// place that translates a `RelayError` into an HTTP status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum RelayError {
    /// Stream id unknown to the substrate (never registered, or its
    /// registration TTL has expired).
    NotRegistered,
    /// Stream is done and the requested offset is at or past the end.
    NoContent,
    /// Storage backend returned 416 Range Not Satisfiable.
    Range,
    /// No storage backend is configured.
    NoStorage,
    /// Storage backend returned 404/403.
    StorageNotFound,
    /// Transient failure: substrate connection error, storage 5xx exhausted
    /// after retries, or a network timeout.
    Transient(String),
    /// HTTP client disconnected mid-stream. Not reported as an error;
    /// callers unwind normally.
    ClientCancel,
    /// Request violated the wire protocol (e.g. missing chunked encoding).
    ProtocolBad(String),
    /// Basic-auth credentials missing or not in the configured store.
    Unauthorized,
    /// Unexpected internal failure with no better classification.
    Internal(String),
}

impl RelayError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotRegistered | Self::StorageNotFound => 404,
            Self::NoContent => 204,
            Self::Range => 416,
            Self::NoStorage => 404,
            Self::Transient(_) => 500,
            Self::ClientCancel => 200,
            Self::ProtocolBad(_) => 400,
            Self::Unauthorized => 401,
            Self::Internal(_) => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRegistered => "NOT_REGISTERED",
            Self::NoContent => "NO_CONTENT",
            Self::Range => "RANGE",
            Self::NoStorage => "NO_STORAGE",
            Self::StorageNotFound => "STORAGE_NOT_FOUND",
            Self::Transient(_) => "TRANSIENT",
            Self::ClientCancel => "CLIENT_CANCEL",
            Self::ProtocolBad(_) => "PROTOCOL_BAD",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) | Self::ProtocolBad(msg) | Self::Internal(msg) => {
                write!(f, "{}: {msg}", self.as_str())
            }
            other => f.write_str(other.as_str()),
        }
    }
}

impl std::error::Error for RelayError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
