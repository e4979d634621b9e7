use std::path::Path;

use serde::{Deserialize, Serialize};
use stowage_fs::atomic_write;
use tracing::debug;

use crate::Result;

/// `.meta` sidecar recorded next to every committed file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub checksum: String,
    pub size:     u64,
}

impl FileMeta {
    pub fn new(checksum: impl Into<String>, size: u64) -> Self {
        Self {
            checksum: checksum.into(),
            size,
        }
    }

    /// Read a sidecar. A missing or unreadable sidecar reads as `None`; the
    /// file it describes is then treated as unverified.
    pub fn read(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(meta) => Some(meta),
            Err(err) => {
                debug!(path = %path.display(), %err, "ignoring malformed sidecar");
                None
            }
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_vec(self)?;
        atomic_write(path, &data)?;
        Ok(())
    }

    /// An empty expected checksum accepts any recorded checksum.
    pub fn matches(&self, checksum: &str, size: u64) -> bool {
        self.size == size
            && (checksum.is_empty() || stowage_verify::checksum_eq(&self.checksum, checksum))
    }
}

/// Whether `final_path` holds a verified copy of a `size`-byte file with the
/// given checksum, judged by its length and `.meta` sidecar.
pub fn is_local_valid(
    final_path: impl AsRef<Path>,
    meta_path: impl AsRef<Path>,
    checksum: &str,
    size: u64,
) -> bool {
    let Ok(metadata) = std::fs::metadata(final_path) else {
        return false;
    };
    metadata.is_file()
        && metadata.len() == size
        && FileMeta::read(meta_path).is_some_and(|m| m.matches(checksum, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b1.pkg.meta");
        FileMeta::new("bb3d", 9).write(&path).unwrap();
        assert_eq!(FileMeta::read(&path), Some(FileMeta::new("bb3d", 9)));
    }

    #[test]
    fn test_malformed_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.meta");
        std::fs::write(&path, b"not json").unwrap();
        assert_eq!(FileMeta::read(&path), None);
        assert_eq!(FileMeta::read(dir.path().join("missing.meta")), None);
    }

    #[test]
    fn test_matches() {
        let meta = FileMeta::new("BB3D", 9);
        assert!(meta.matches("bb3d", 9));
        assert!(meta.matches("", 9));
        assert!(!meta.matches("bb3d", 10));
        assert!(!meta.matches("0000", 9));
    }

    #[test]
    fn test_is_local_valid() {
        let dir = tempdir().unwrap();
        let fin = dir.path().join("b1.pkg");
        let meta = dir.path().join("b1.pkg.meta");

        assert!(!is_local_valid(&fin, &meta, "bb3d", 9));

        std::fs::write(&fin, b"123456789").unwrap();
        assert!(!is_local_valid(&fin, &meta, "bb3d", 9));

        FileMeta::new("bb3d", 9).write(&meta).unwrap();
        assert!(is_local_valid(&fin, &meta, "bb3d", 9));
        assert!(!is_local_valid(&fin, &meta, "ffff", 9));

        std::fs::write(&fin, b"12345678").unwrap();
        assert!(!is_local_valid(&fin, &meta, "bb3d", 9));
    }
}
