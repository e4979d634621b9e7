use std::collections::HashMap;
use std::io::{Read, Seek};

use tracing::{trace, warn};

use crate::sanitize::normalize_entry_path;
use crate::{ArchiveError, Result};

/// Upper bound on buffer space reserved from a declared entry size.
const PREALLOC_LIMIT: u64 = 1 << 20;

#[derive(Clone, Copy, Debug)]
struct EntryInfo {
    index: usize,
    size:  u64,
}

/// Random-access view of a zip bundle.
///
/// Opening reads only the central directory. Member bytes are decompressed
/// when [`ArchiveReader::read`] asks for them.
pub struct ArchiveReader<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
    entries: HashMap<String, EntryInfo>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader).map_err(ArchiveError::Corrupted)?;
        let mut entries = HashMap::with_capacity(archive.len());

        for index in 0..archive.len() {
            let file = archive.by_index(index).map_err(ArchiveError::Corrupted)?;
            if file.is_dir() {
                continue;
            }
            match normalize_entry_path(file.name()) {
                Ok(name) if !name.is_empty() => {
                    entries.entry(name).or_insert(EntryInfo {
                        index,
                        size: file.size(),
                    });
                }
                Ok(_) => {}
                Err(err) => warn!(entry = file.name(), %err, "skipping archive entry"),
            }
        }

        trace!(entries = entries.len(), "opened archive");
        Ok(Self { archive, entries })
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entries(&self) -> impl Iterator<Item = &str> { self.entries.keys().map(String::as_str) }

    pub fn contains(&self, name: &str) -> bool {
        normalize_entry_path(name).is_ok_and(|n| self.entries.contains_key(&n))
    }

    /// Uncompressed size of an entry.
    pub fn size(&self, name: &str) -> Option<u64> {
        let name = normalize_entry_path(name).ok()?;
        self.entries.get(&name).map(|e| e.size)
    }

    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let key = normalize_entry_path(name)?;
        let info = *self
            .entries
            .get(&key)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;

        let mut file = self.archive.by_index(info.index).map_err(ArchiveError::Corrupted)?;
        let mut out = Vec::with_capacity(info.size.min(PREALLOC_LIMIT) as usize);
        file.read_to_end(&mut out).map_err(|source| ArchiveError::Read {
            name: key.clone(),
            source,
        })?;
        Ok(out)
    }

    pub fn into_inner(self) -> R { self.archive.into_inner() }
}
