//! Error types shared between the REST client and its callers.

use thiserror::Error;

/// Failure of a REST call.
///
/// Only durable-write failures ever reach the user (as a failed-send marker
/// on the affected message); everything else is the caller's concern to log
/// and retry as it sees fit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
}
