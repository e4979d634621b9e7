use crate::{ArchiveError, Result};

/// Normalize an archive entry name into the form used for lookups.
///
/// Backslashes become `/`, leading `./` and `/` are stripped and repeated
/// separators collapse. Names that climb out of the archive (`..`) or carry a
/// NUL byte are rejected.
pub fn normalize_entry_path(raw: &str) -> Result<String> {
    if raw.contains('\0') {
        return Err(ArchiveError::InvalidPath(raw.to_string()));
    }

    let replaced = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for part in replaced.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(ArchiveError::InvalidPath(raw.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_entry_path("a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize_entry_path("./a//b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize_entry_path("/a\\b\\c.bin").unwrap(), "a/b/c.bin");
    }

    #[test]
    fn test_rejects_escape_and_nul() {
        assert!(matches!(
            normalize_entry_path("../etc/passwd"),
            Err(ArchiveError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize_entry_path("a/../../b"),
            Err(ArchiveError::InvalidPath(_))
        ));
        assert!(matches!(normalize_entry_path("a\0b"), Err(ArchiveError::InvalidPath(_))));
    }
}
