use std::path::{Path, PathBuf};

pub const PART_SUFFIX: &str = ".part";
pub const META_SUFFIX: &str = ".meta";

/// On-disk layout of a bundle cache directory.
///
/// Every bundle `name` owns up to three files under the root: the committed
/// file, an in-progress `.part` file and a `.meta` sidecar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageLayout {
    root: PathBuf,
}

impl PackageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    pub fn final_path(&self, name: &str) -> PathBuf { self.root.join(name) }

    pub fn part_path(&self, name: &str) -> PathBuf { self.root.join(format!("{name}{PART_SUFFIX}")) }

    pub fn meta_path(&self, name: &str) -> PathBuf { self.root.join(format!("{name}{META_SUFFIX}")) }

    /// Directory a file-list bundle expands into: the bundle name minus its
    /// extension.
    pub fn expanded_dir(&self, name: &str) -> PathBuf {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        self.root.join(stem)
    }
}
