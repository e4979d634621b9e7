use std::collections::HashMap;

use tracing::warn;

use crate::{BundleInfo, LoadFlags, Manifest, ManifestError, Result, asset_key};

/// Validated lookup structure over a [`Manifest`].
///
/// Built once per manifest and swapped in whole when a newer manifest is
/// installed.
#[derive(Clone, Debug)]
pub struct ManifestIndex {
    manifest: Manifest,
    by_name:  HashMap<String, usize>,
    by_asset: HashMap<String, usize>,
}

impl ManifestIndex {
    /// Index `manifest`, rejecting duplicate bundle names, dangling
    /// dependencies and dependency cycles.
    ///
    /// An asset path declared by several bundles resolves to the first.
    pub fn new(manifest: Manifest) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(manifest.bundles.len());
        for (i, bundle) in manifest.bundles.iter().enumerate() {
            if by_name.insert(bundle.name.clone(), i).is_some() {
                return Err(ManifestError::DuplicateBundle(bundle.name.clone()));
            }
        }

        for bundle in &manifest.bundles {
            for dep in &bundle.dependencies {
                if !by_name.contains_key(dep) {
                    return Err(ManifestError::UnknownDependency {
                        bundle:     bundle.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        check_acyclic(&manifest.bundles, &by_name)?;

        let mut by_asset = HashMap::new();
        for (i, bundle) in manifest.bundles.iter().enumerate() {
            for asset in &bundle.assets {
                let key = asset_key(asset);
                if let Some(&first) = by_asset.get(&key) {
                    let first: &BundleInfo = &manifest.bundles[first];
                    warn!(
                        asset = %key,
                        kept = %first.name,
                        ignored = %bundle.name,
                        "asset declared by more than one bundle"
                    );
                    continue;
                }
                by_asset.insert(key, i);
            }
        }

        Ok(Self {
            manifest,
            by_name,
            by_asset,
        })
    }

    pub fn manifest(&self) -> &Manifest { &self.manifest }

    pub fn build(&self) -> u64 { self.manifest.build }

    pub fn bundles(&self) -> &[BundleInfo] { &self.manifest.bundles }

    pub fn bundle(&self, name: &str) -> Option<&BundleInfo> {
        self.by_name.get(name).map(|&i| &self.manifest.bundles[i])
    }

    /// Bundle that carries the asset at `path`.
    pub fn bundle_for_asset(&self, path: &str) -> Option<&BundleInfo> {
        self.by_asset
            .get(&asset_key(path))
            .map(|&i| &self.manifest.bundles[i])
    }

    /// Bundles whose load classes intersect `mask`, in manifest order.
    pub fn matching(&self, mask: LoadFlags) -> impl Iterator<Item = &BundleInfo> {
        self.manifest
            .bundles
            .iter()
            .filter(move |b| b.load.intersects(mask))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

// Iterative DFS. Self edges are tolerated; the bundle graph ignores them.
fn check_acyclic(bundles: &[BundleInfo], by_name: &HashMap<String, usize>) -> Result<()> {
    let mut marks = vec![Mark::Unvisited; bundles.len()];

    for root in 0..bundles.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        let mut stack = vec![(root, 0usize)];
        marks[root] = Mark::InProgress;

        while let Some((node, next)) = stack.pop() {
            let deps = &bundles[node].dependencies;
            if next == deps.len() {
                marks[node] = Mark::Done;
                continue;
            }
            stack.push((node, next + 1));

            let dep = by_name[&deps[next]];
            if dep == node {
                continue;
            }
            match marks[dep] {
                Mark::InProgress => {
                    return Err(ManifestError::DependencyCycle(bundles[dep].name.clone()));
                }
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    stack.push((dep, 0));
                }
                Mark::Done => {}
            }
        }
    }
    Ok(())
}
