use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Write `content` to a sibling temp file, then rename it over `path`.
///
/// Readers never observe a half-written file. The parent directory is
/// created when missing.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().ok_or_else(|| Error::Write {
        path:   path.to_path_buf(),
        source: io::Error::other("no parent directory"),
    })?;
    ensure_dir(parent)?;

    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(content).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Move a finished download into place: delete the destination, then rename.
///
/// A missing destination is fine. On platforms where rename refuses to
/// overwrite this is the only portable sequence.
pub fn replace_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    let replace_err = |source| Error::Replace {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        source,
    };

    match fs::remove_file(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(replace_err(e)),
    }
    fs::rename(src, dst).map_err(replace_err)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Write {
            path:   path.to_path_buf(),
            source: e,
        }),
    }
}

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| Error::Write {
        path:   path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("manifest.pkg");
        atomic_write(&path, b"hello world").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.meta");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.meta")]);
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn test_replace_file_overwrites() {
        let dir = tempdir().unwrap();
        let part = dir.path().join("b1.pkg.part");
        let fin = dir.path().join("b1.pkg");
        fs::write(&part, b"new").unwrap();
        fs::write(&fin, b"old").unwrap();

        replace_file(&part, &fin).unwrap();
        assert!(!part.exists());
        assert_eq!(fs::read(&fin).unwrap(), b"new");
    }

    #[test]
    fn test_replace_file_missing_destination() {
        let dir = tempdir().unwrap();
        let part = dir.path().join("x.part");
        let fin = dir.path().join("x");
        fs::write(&part, b"payload").unwrap();

        replace_file(&part, &fin).unwrap();
        assert_eq!(fs::read(&fin).unwrap(), b"payload");
    }

    #[test]
    fn test_replace_file_missing_source() {
        let dir = tempdir().unwrap();
        let err = replace_file(dir.path().join("nope"), dir.path().join("dst")).unwrap_err();
        assert!(matches!(err, Error::Replace { .. }));
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }
}
