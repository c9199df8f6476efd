//! Error types.
//!
//! Only [`Error`] ever escapes a run. Everything that can go wrong with a
//! single document is folded into a [`FailureKind`](crate::pipeline::FailureKind)
//! by the pipeline and counted instead.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;
use url::Url;

/// Result alias for run-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal, run-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad arguments, detected before any work starts.
    #[error("usage error: {0}")]
    Usage(String),

    /// The listing page could not be read or navigated.
    #[error("listing source unavailable: {source_name}: {reason}")]
    ListingUnavailable { source_name: String, reason: String },

    /// The output directory could not be created.
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The browser driver could not be started or reached.
    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure to obtain rendered content for a page.
#[derive(Debug, Error)]
pub enum PageError {
    /// The page did not signal completion within the bound.
    #[error("page {url} did not finish loading within {after:?}")]
    Timeout { url: Url, after: Duration },

    /// Navigation itself failed (driver error, bad status, transport error).
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: Url, reason: String },

    #[error("invalid CSS selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

/// Classified failure of a single asset retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// A 2xx response whose body is a challenge page rather than the asset.
    #[error("blocked response: {0}")]
    Blocked(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::HttpStatus(status.as_u16()),
            None => Self::Network(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The asset URL has no final path segment to name the file after.
    #[error("no file name in asset URL {0}")]
    NoFileName(Url),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure while persisting a fetched stream.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The body stream failed mid-transfer; the partial file was removed.
    #[error(transparent)]
    Stream(#[from] FetchError),
}
