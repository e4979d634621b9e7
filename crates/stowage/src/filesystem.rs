use bytes::Bytes;
use stowage_manifest::BundleKind;

use crate::bundle::Bundle;
use crate::{ProviderError, Result};

/// Read-only view over a zip or file-list bundle.
///
/// Holds a reference on the bundle for as long as it lives. A view over a
/// bundle that does not exist or has the wrong kind reports every path as
/// missing.
#[derive(Debug)]
pub struct BundleFileSystem {
    name:  String,
    inner: std::result::Result<Bundle, String>,
}

impl BundleFileSystem {
    pub(crate) fn new(bundle: Bundle) -> Self {
        let name = bundle.name().to_string();
        match bundle.kind() {
            kind if Self::supports(kind) => Self {
                name,
                inner: Ok(bundle),
            },
            other => Self::unsupported(name, other),
        }
    }

    pub(crate) fn supports(kind: BundleKind) -> bool {
        matches!(kind, BundleKind::ZipArchive | BundleKind::FileList)
    }

    pub(crate) fn unsupported(name: impl Into<String>, kind: BundleKind) -> Self {
        Self::failed(name, format!("{kind:?} bundles have no file system"))
    }

    pub(crate) fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name:  name.into(),
            inner: Err(reason.into()),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn bundle(&self) -> Option<&Bundle> { self.inner.as_ref().ok() }

    /// The bundle is loaded with a readable payload.
    pub fn is_ready(&self) -> bool { self.bundle().is_some_and(Bundle::is_available) }

    /// Run `f` once the underlying bundle has loaded; never for a failed view.
    pub fn on_ready(&self, f: impl FnOnce() + 'static) {
        if let Some(bundle) = self.bundle() {
            bundle.on_loaded(f);
        }
    }

    pub fn exists(&self, path: &str) -> bool { self.bundle().is_some_and(|b| b.contains(path)) }

    pub fn entries(&self) -> Vec<String> { self.bundle().map(Bundle::entries).unwrap_or_default() }

    pub fn read(&self, path: &str) -> Result<Bytes> {
        match &self.inner {
            Ok(bundle) => bundle.read_bytes(path),
            Err(reason) => Err(ProviderError::unavailable(&self.name, reason)),
        }
    }

    pub fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProviderError::TypeMismatch {
            path:      path.to_string(),
            requested: "text",
        })
    }
}
