//! File primitives for the bundle cache.
//!
//! - [`PackageLayout`]: where a bundle, its `.part` and its `.meta` live.
//! - [`atomic_write`]: temp-then-rename writes for sidecars and manifests.
//! - [`replace_file`]: delete-then-rename commit of a finished download.

mod atomic;
mod error;
mod layout;

pub use atomic::{atomic_write, ensure_dir, remove_if_exists, replace_file};
pub use error::{Error, Result};
pub use layout::{META_SUFFIX, PART_SUFFIX, PackageLayout};
