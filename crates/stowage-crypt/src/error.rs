use std::io;

#[derive(Debug, thiserror::Error)]
pub enum CryptError {
    #[error("chunk {index} is {len} bytes, not a multiple of the cipher block")]
    Misaligned { index: u64, len: usize },

    #[error("failed to decrypt chunk {index}")]
    Decrypt { index: u64 },

    #[error("encrypted stream is truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<CryptError> for io::Error {
    fn from(err: CryptError) -> Self {
        match err {
            CryptError::Io(e) => e,
            CryptError::Truncated { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CryptError>;
