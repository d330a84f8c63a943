use std::path::Path;

/// Errors that can occur while probing or downloading an upstream file.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("no size indicator for {0}")]
    NoSize(String),

    #[error("downloaded file {0} is empty")]
    EmptyDownload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An upstream source of geo database files.
///
/// Implementations must answer a metadata-only size query without
/// transferring the body, and stream full downloads with bounded memory.
#[async_trait::async_trait]
pub trait Remote: Send + Sync {
    /// Declared byte size of the resource at this moment.
    ///
    /// A missing size indicator or a non-success response is an error,
    /// never a sentinel value: callers cannot decide anything without it.
    async fn remote_size(&self, url: &str) -> Result<u64, FetchError>;

    /// Stream the full resource to `dest`, overwriting existing content.
    ///
    /// A zero-byte result is rejected as [`FetchError::EmptyDownload`]
    /// even when the transport reported success. Returns bytes written.
    /// After an error the state of `dest` is unspecified: an implementation
    /// may have left a partial artifact behind, so callers must not treat
    /// the destination as a valid copy.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}
