use std::io;
use std::path::PathBuf;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[source] BoxError),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("request timed out")]
    Timeout,

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("file I/O error on {path}")]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move download into place")]
    Commit(#[source] stowage_fs::Error),

    #[error("failed to record sidecar")]
    Sidecar(#[source] stowage_manifest::ManifestError),

    #[error("download aborted")]
    Aborted,
}

impl FetchError {
    pub fn network(err: impl Into<BoxError>) -> Self { Self::Network(err.into()) }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// The bytes arrived but were not the expected ones.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. } | Self::ChecksumMismatch { .. })
    }

    /// The remote could not be reached or answered badly.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::HttpStatus { .. } | Self::Timeout)
    }

    pub fn is_aborted(&self) -> bool { matches!(self, Self::Aborted) }
}

pub type Result<T> = std::result::Result<T, FetchError>;
