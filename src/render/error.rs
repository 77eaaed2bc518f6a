//! Errors raised while loading a page. `NavigationError` is the only error the renderer surfaces.

use thiserror::Error;

/// Failure reported by a rendering backend for a single operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not start rendering session: {reason}")]
    Launch { reason: String },

    #[error("unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("timed out after {timeout_secs}s loading {url}")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when loading {url}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to read document body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no document loaded in this session")]
    NotLoaded,

    /// Backend-specific failure with no richer structure.
    #[error("{0}")]
    Backend(String),
}

/// Terminal renderer failure. Carries the last underlying cause.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Could not open a rendering session: {0}")]
    Launch(#[source] SessionError),

    #[error("Could not load {url}: {source}")]
    Load {
        url: String,
        #[source]
        source: SessionError,
    },

    #[error("Could not read rendered page {url}: {source}")]
    Snapshot {
        url: String,
        #[source]
        source: SessionError,
    },
}
