use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("malformed json")]
    Json(#[from] serde_json::Error),

    #[error("failed to decompress manifest")]
    Decompress(#[source] io::Error),

    #[error("failed to decrypt manifest")]
    Crypt(#[from] stowage_crypt::CryptError),

    #[error(transparent)]
    Fs(#[from] stowage_fs::Error),

    #[error("bundle {0} is declared more than once")]
    DuplicateBundle(String),

    #[error("bundle {bundle} depends on unknown bundle {dependency}")]
    UnknownDependency { bundle: String, dependency: String },

    #[error("dependency cycle through bundle {0}")]
    DependencyCycle(String),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
