use std::io;
use std::path::PathBuf;

use stowage_manifest::ManifestError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider is closed")]
    Closed,

    #[error("no manifest installed")]
    NoManifest,

    #[error("asset {0} is not listed in the manifest")]
    UnknownAsset(String),

    #[error("bundle {0} is not listed in the manifest")]
    UnknownBundle(String),

    #[error("asset {path} cannot be read as {requested}")]
    TypeMismatch { path: String, requested: &'static str },

    #[error("bundle {bundle} is unavailable: {reason}")]
    Unavailable { bundle: String, reason: String },

    #[error("bundle {0} is not loaded yet")]
    NotLoaded(String),

    #[error("asset {0} was disposed")]
    Disposed(String),

    #[error("bundle {0} is encrypted and no password is configured")]
    MissingPassword(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Fetch(#[from] stowage_fetch::FetchError),

    #[error(transparent)]
    Fs(#[from] stowage_fs::Error),

    #[error("failed to start download worker")]
    Spawn(#[source] io::Error),

    #[error("invalid configuration")]
    Config(#[from] toml::de::Error),

    #[error("I/O error on {path}")]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProviderError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn unavailable(bundle: &str, reason: impl ToString) -> Self {
        Self::Unavailable {
            bundle: bundle.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
