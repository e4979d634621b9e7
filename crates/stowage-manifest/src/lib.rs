//! Bundle manifest: what exists, where assets live, and how files are
//! described on the wire and on disk.

mod codec;
mod error;
mod index;
mod meta;
mod model;
mod path;

pub use codec::{
    CHECKSUM_FILE, EncodedManifest, MANIFEST_FILE, ManifestCipher, decode_manifest,
    encode_manifest,
};
pub use error::{ManifestError, Result};
pub use index::ManifestIndex;
pub use meta::{FileMeta, is_local_valid};
pub use model::{
    BundleInfo, BundleKind, ChecksumInfo, EmbeddedEntry, EmbeddedManifest, FileListEntry,
    FileListing, LoadFlags, Manifest,
};
pub use path::asset_key;
