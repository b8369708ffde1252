//! Error types for tile loading

use thiserror::Error;

/// Errors produced by the tile cache, queue and loader.
///
/// Fetch-side variants never escape a worker: they are reported as
/// [`LoaderEvent::TileFailed`](crate::tiles::LoaderEvent::TileFailed) and the
/// tile is simply requested again on a later draw pass.
#[derive(Debug, Error)]
pub enum TileError {
    /// Transport-level failure (connection refused, unknown host, timeout, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Server answered with an empty body
    #[error("empty response body from {0}")]
    EmptyBody(String),

    /// Payload could not be decoded as an image
    #[error("failed to decode tile image: {0}")]
    Decode(#[from] image::ImageError),

    /// Fetch task panicked or was cancelled before finishing
    #[error("tile fetch did not complete: {0}")]
    Interrupted(String),

    /// Rejected construction parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Loader was created outside of a tokio runtime
    #[error("no tokio runtime available to run tile workers")]
    NoRuntime,
}

/// Result alias for tile operations.
pub type Result<T, E = TileError> = std::result::Result<T, E>;
