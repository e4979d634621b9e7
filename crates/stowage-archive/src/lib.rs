//! Zip bundles as queryable file listings.

mod error;
mod reader;
mod sanitize;

pub use error::{ArchiveError, Result};
pub use reader::ArchiveReader;
pub use sanitize::normalize_entry_path;
