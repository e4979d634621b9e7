//! Reference-counted bundle and asset streaming.
//!
//! A [`BundleAssetProvider`] resolves asset paths to bundles through the
//! installed manifest, finds each bundle's bytes in the local cache, the
//! shipped streaming location or the CDN, and hands out [`Asset`] and
//! [`Bundle`] handles whose lifetimes keep bundles resident. Everything here
//! lives on one main context; only downloads run elsewhere.

mod asset;
mod bundle;
mod config;
mod container;
mod error;
mod filesystem;
mod hints;
mod listener;
mod provider;
mod serial;
mod signal;

pub use asset::{Asset, AssetType};
pub use bundle::{Bundle, BundleState, WeakBundle};
pub use config::ProviderConfig;
pub use container::{BundleSource, Container, ContainerLoader, PackedContainerLoader, ReadSeek};
pub use error::{ProviderError, Result};
pub use filesystem::BundleFileSystem;
pub use hints::{Lane, LoadHints};
pub use listener::{NoopListener, PasswordSupplier, ProviderListener};
pub use provider::{
    BundleAssetProvider, EMBEDDED_FILE, EnsureSummary, ProviderBuilder, ValidationResult,
};
pub use serial::SerialQueue;
pub use signal::{Completion, Countdown};

pub use stowage_fetch::{HttpClient, JobInfo, JobReport, JobStatus};
#[cfg(feature = "reqwest")]
pub use stowage_fetch::ReqwestClient;
pub use stowage_manifest::{BundleInfo, BundleKind, LoadFlags, Manifest, ManifestIndex};
