use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive is corrupted")]
    Corrupted(#[source] zip::result::ZipError),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("invalid entry path: {0:?}")]
    InvalidPath(String),

    #[error("failed to read entry {name}")]
    Read {
        name:   String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
