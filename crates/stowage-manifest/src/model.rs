use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Load classes a bundle belongs to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LoadFlags: u32 {
        const STARTUP   = 1;
        const IMPORTANT = 1 << 1;
        const NORMAL    = 1 << 2;
        const OPTIONAL  = 1 << 3;
    }
}

impl LoadFlags {
    pub const ANY: Self = Self::all();
}

impl Default for LoadFlags {
    fn default() -> Self { Self::NORMAL }
}

mod load_bits {
    use super::LoadFlags;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flags: &LoadFlags, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(flags.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<LoadFlags, D::Error> {
        u32::deserialize(d).map(LoadFlags::from_bits_truncate)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BundleKind {
    /// Engine-native binary container.
    #[default]
    AssetBundle,
    ZipArchive,
    FileList,
    RawFile,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleInfo {
    pub name:         String,
    #[serde(rename = "type")]
    pub kind:         BundleKind,
    #[serde(with = "load_bits")]
    pub load:         LoadFlags,
    /// Size of the file as stored and downloaded.
    pub size:         u64,
    pub checksum:     String,
    /// Plaintext size when `encrypted`.
    pub rsize:        u64,
    pub encrypted:    bool,
    pub priority:     i32,
    pub dependencies: Vec<String>,
    pub assets:       Vec<String>,
}

impl BundleInfo {
    pub fn new(name: impl Into<String>, kind: BundleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn load(mut self, load: LoadFlags) -> Self {
        self.load = load;
        self
    }

    #[must_use]
    pub fn file(mut self, size: u64, checksum: impl Into<String>) -> Self {
        self.size = size;
        self.checksum = checksum.into();
        self
    }

    #[must_use]
    pub fn encrypted(mut self, rsize: u64) -> Self {
        self.encrypted = true;
        self.rsize = rsize;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    #[must_use]
    pub fn asset(mut self, path: impl Into<String>) -> Self {
        self.assets.push(path.into());
        self
    }

    /// Length of the plaintext payload.
    pub fn plain_size(&self) -> u64 { if self.encrypted { self.rsize } else { self.size } }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    pub build:      u64,
    pub chunk_size: usize,
    pub tag:        String,
    pub bundles:    Vec<BundleInfo>,
}

/// Contents of `checksum.txt`, describing the current `manifest.pkg`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChecksumInfo {
    pub name:       String,
    pub size:       u64,
    pub rsize:      u64,
    pub checksum:   String,
    pub chunk_size: usize,
}

impl ChecksumInfo {
    pub fn is_encrypted(&self) -> bool { self.chunk_size != 0 }
}

/// One file the game ships in its read-only streaming location.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedEntry {
    pub name:     String,
    pub checksum: String,
    pub size:     u64,
}

/// `embedded.json`: bundles pre-shipped with the build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedManifest {
    pub bundles: Vec<EmbeddedEntry>,
}

impl EmbeddedManifest {
    pub fn find(&self, name: &str) -> Option<&EmbeddedEntry> {
        self.bundles.iter().find(|e| e.name == name)
    }

    /// The shipped copy can stand in for `info` only if it is the same file.
    pub fn serves(&self, info: &BundleInfo) -> bool {
        self.find(&info.name).is_some_and(|e| {
            e.size == info.size && stowage_verify::checksum_eq(&e.checksum, &info.checksum)
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileListEntry {
    /// Asset path served by this entry.
    pub path: String,
    /// File relative to the expanded file-list directory.
    pub file: String,
    pub size: u64,
}

/// Payload of a `FileList` bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileListing {
    pub files: Vec<FileListEntry>,
}

impl FileListing {
    pub fn from_slice(data: &[u8]) -> crate::Result<Self> { Ok(serde_json::from_slice(data)?) }

    pub fn find(&self, path: &str) -> Option<&FileListEntry> {
        let key = crate::asset_key(path);
        self.files.iter().find(|f| crate::asset_key(&f.path) == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_covers_declared_flags() {
        assert_eq!(LoadFlags::ANY.bits(), 0b1111);
        assert!(LoadFlags::ANY.contains(LoadFlags::OPTIONAL));
        assert!(!(LoadFlags::STARTUP | LoadFlags::NORMAL).intersects(LoadFlags::OPTIONAL));
    }

    #[test]
    fn test_bundle_info_json() {
        let json = r#"{
            "name": "b1.pkg",
            "type": "ZipArchive",
            "load": 3,
            "size": 120,
            "checksum": "bb3d",
            "dependencies": ["base.pkg"],
            "assets": ["ui/a.png"],
            "futureField": true
        }"#;
        let info: BundleInfo = serde_json::from_str(json).unwrap();

        assert_eq!(info.kind, BundleKind::ZipArchive);
        assert_eq!(info.load, LoadFlags::STARTUP | LoadFlags::IMPORTANT);
        assert!(!info.encrypted);
        assert_eq!(info.priority, 0);
        assert_eq!(info.dependencies, vec!["base.pkg"]);

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], "ZipArchive");
        assert_eq!(value["load"], 3);
    }

    #[test]
    fn test_unknown_load_bits_are_dropped() {
        let info: BundleInfo = serde_json::from_str(r#"{"name":"x","load":255}"#).unwrap();
        assert_eq!(info.load, LoadFlags::ANY);
    }

    #[test]
    fn test_checksum_info() {
        let info: ChecksumInfo = serde_json::from_str(
            r#"{"name":"manifest.pkg","size":10,"rsize":9,"checksum":"abcd","chunkSize":4096}"#,
        )
        .unwrap();
        assert!(info.is_encrypted());
        assert_eq!(info.chunk_size, 4096);
    }

    #[test]
    fn test_embedded_serves_only_identical_files() {
        let embedded: EmbeddedManifest = serde_json::from_str(
            r#"{"bundles":[{"name":"b1.pkg","checksum":"BB3D","size":9}]}"#,
        )
        .unwrap();

        let same = BundleInfo::new("b1.pkg", BundleKind::RawFile).file(9, "bb3d");
        let stale = BundleInfo::new("b1.pkg", BundleKind::RawFile).file(9, "0001");
        let other = BundleInfo::new("b2.pkg", BundleKind::RawFile).file(9, "bb3d");
        assert!(embedded.serves(&same));
        assert!(!embedded.serves(&stale));
        assert!(!embedded.serves(&other));
    }

    #[test]
    fn test_file_listing_lookup() {
        let listing = FileListing::from_slice(
            br#"{"files":[{"path":"audio/click.ogg","file":"click.ogg","size":4}]}"#,
        )
        .unwrap();
        assert_eq!(listing.find("./audio\\click.ogg").unwrap().file, "click.ogg");
        assert!(listing.find("audio/missing.ogg").is_none());
    }
}
