//! Error types for the store, the ingestion adapter, and the HTTP edge.

use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

// ---

/// Failures reading or writing the CSV record store.
#[derive(Debug, Error)]
pub enum StoreError {
    // ---
    #[error("failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid row {row} in {path}: {reason}")]
    InvalidRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },
}

/// Failures fetching or decoding the remote measurements feed.
#[derive(Debug, Error)]
pub enum IngestError {
    // ---
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected feed shape: {0}")]
    Shape(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Invalid aggregation parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    // ---
    #[error("unknown span '{0}', expected one of: raw, hour, day, max")]
    UnknownSpan(String),

    #[error("unknown reducer '{0}', expected one of: mean, max")]
    UnknownReducer(String),

    #[error("span 'max' always reduces with max and cannot be combined with reducer '{0}'")]
    ConflictingReducer(String),

    #[error("a reducer requires an aggregating span (hour, day or max)")]
    ReducerWithoutSpan,
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // ---
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        tracing::debug!("Rejecting request: {}", message);

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
