use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::bundle::Bundle;
use crate::signal::Completion;
use crate::{ProviderError, Result};

/// How an asset's contents are materialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AssetType {
    #[default]
    Bytes,
    Text,
    /// An engine object built by the bundle's container.
    Object,
}

impl AssetType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Text => "text",
            Self::Object => "object",
        }
    }
}

enum AssetValue {
    Bytes(Bytes),
    Object(Rc<dyn Any>),
}

pub(crate) struct AssetNode {
    path:      String,
    ty:        AssetType,
    bundle:    RefCell<Option<Bundle>>,
    completed: Completion,
    disposed:  Cell<bool>,
    value:     RefCell<Option<AssetValue>>,
    error:     RefCell<Option<Rc<ProviderError>>>,
}

/// Shared handle to one asset.
///
/// Handles for the same path are the same asset while any of them is alive.
/// The asset holds a reference on its bundle until it is disposed or the last
/// handle drops.
#[derive(Clone)]
pub struct Asset(Rc<AssetNode>);

impl Asset {
    fn with_bundle(path: String, ty: AssetType, bundle: Option<Bundle>) -> Self {
        Self(Rc::new(AssetNode {
            path,
            ty,
            bundle: RefCell::new(bundle),
            completed: Completion::new(),
            disposed: Cell::new(false),
            value: RefCell::new(None),
            error: RefCell::new(None),
        }))
    }

    pub(crate) fn pending(path: String, ty: AssetType, bundle: Bundle) -> Self {
        Self::with_bundle(path, ty, Some(bundle))
    }

    /// An already-completed asset that never became available.
    pub(crate) fn failed(path: String, ty: AssetType, error: ProviderError) -> Self {
        let asset = Self::with_bundle(path, ty, None);
        asset.complete(Err(error));
        asset
    }

    pub(crate) fn from_node(node: Rc<AssetNode>) -> Self { Self(node) }

    pub(crate) fn downgrade(&self) -> Weak<AssetNode> { Rc::downgrade(&self.0) }

    pub fn path(&self) -> &str { &self.0.path }

    pub fn asset_type(&self) -> AssetType { self.0.ty }

    pub fn ptr_eq(&self, other: &Asset) -> bool { Rc::ptr_eq(&self.0, &other.0) }

    /// Name of the owning bundle, until disposal.
    pub fn bundle_name(&self) -> Option<String> {
        self.0.bundle.borrow().as_ref().map(|b| b.name().to_string())
    }

    pub fn is_completed(&self) -> bool { self.0.completed.is_done() }

    pub fn is_disposed(&self) -> bool { self.0.disposed.get() }

    /// Completed with contents.
    pub fn is_available(&self) -> bool { !self.is_disposed() && self.0.value.borrow().is_some() }

    pub fn error(&self) -> Option<Rc<ProviderError>> { self.0.error.borrow().clone() }

    /// Run `f` when the asset completes, successfully or not; inline if it
    /// already has. The asset stays alive until then.
    pub fn on_completed(&self, f: impl FnOnce(&Asset) + 'static) {
        let this = self.clone();
        self.0.completed.subscribe(move || f(&this));
    }

    /// Raw contents. A disposed asset reads as empty.
    pub fn read_all_bytes(&self) -> Result<Bytes> {
        if self.0.ty == AssetType::Object {
            return Err(self.mismatch(AssetType::Bytes));
        }
        if self.is_disposed() {
            return Ok(Bytes::new());
        }
        if let Some(AssetValue::Bytes(bytes)) = &*self.0.value.borrow() {
            return Ok(bytes.clone());
        }
        if let Some(error) = self.error() {
            return Err(ProviderError::unavailable(self.path(), error));
        }

        // bundle is ready but extraction has not run yet
        let bundle = self.0.bundle.borrow().clone();
        match bundle {
            Some(bundle) if bundle.is_loaded() => bundle.read_bytes(self.path()),
            _ => Err(ProviderError::NotLoaded(self.path().to_string())),
        }
    }

    pub fn read_text(&self) -> Result<String> {
        let bytes = self.read_all_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.mismatch(AssetType::Text))
    }

    /// The engine object, if the asset is an available `Object` of type `T`.
    pub fn object<T: Any>(&self) -> Option<Rc<T>> {
        match &*self.0.value.borrow() {
            Some(AssetValue::Object(obj)) => obj.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Drop the contents and the bundle reference. A pending asset completes
    /// with [`ProviderError::Disposed`].
    pub fn dispose(&self) {
        if self.0.disposed.replace(true) {
            return;
        }
        let bundle = self.0.bundle.borrow_mut().take();
        let value = self.0.value.borrow_mut().take();
        trace!(asset = %self.path(), "disposed");

        if !self.is_completed() {
            *self.0.error.borrow_mut() = Some(Rc::new(ProviderError::Disposed(self.0.path.clone())));
            self.0.completed.complete();
        }
        drop(value);
        drop(bundle);
    }

    /// Pull the contents out of the loaded bundle.
    pub(crate) fn extract(&self) {
        if self.is_completed() || self.is_disposed() {
            return;
        }
        let Some(bundle) = self.0.bundle.borrow().clone() else {
            return;
        };
        let result = match self.0.ty {
            AssetType::Object => bundle.load_object(self.path()).map(AssetValue::Object),
            AssetType::Bytes | AssetType::Text => {
                bundle.read_bytes(self.path()).map(AssetValue::Bytes)
            }
        };
        drop(bundle);
        self.complete(result);
    }

    fn complete(&self, result: Result<AssetValue>) {
        match result {
            Ok(value) => *self.0.value.borrow_mut() = Some(value),
            Err(err) => {
                debug!(asset = %self.path(), error = %err, "asset unavailable");
                *self.0.error.borrow_mut() = Some(Rc::new(err));
            }
        }
        self.0.completed.complete();
    }

    fn mismatch(&self, requested: AssetType) -> ProviderError {
        ProviderError::TypeMismatch {
            path:      self.path().to_string(),
            requested: requested.as_str(),
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("path", &self.path())
            .field("type", &self.asset_type())
            .field("completed", &self.is_completed())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use stowage_manifest::{BundleInfo, BundleKind};

    fn raw_bundle(data: &[u8]) -> Bundle {
        let bundle = Bundle::detached(BundleInfo::new("raw.bin", BundleKind::RawFile).asset("raw.bin"), "");
        bundle.load(Some(Box::new(Cursor::new(data.to_vec()))), true);
        bundle
    }

    #[test]
    fn test_extract_then_read() {
        let asset = Asset::pending("raw.bin".into(), AssetType::Text, raw_bundle(b"hello"));
        let seen = Rc::new(Cell::new(false));
        let s = seen.clone();
        asset.on_completed(move |a| s.set(a.is_available()));

        asset.extract();
        assert!(seen.get());
        assert_eq!(asset.read_text().unwrap(), "hello");
        assert_eq!(asset.bundle_name().as_deref(), Some("raw.bin"));
    }

    #[test]
    fn test_read_before_extraction_uses_loaded_bundle() {
        let asset = Asset::pending("raw.bin".into(), AssetType::Bytes, raw_bundle(b"xyz"));
        assert!(!asset.is_completed());
        assert_eq!(&asset.read_all_bytes().unwrap()[..], b"xyz");
    }

    #[test]
    fn test_object_type_rejects_bytes() {
        let asset = Asset::pending("raw.bin".into(), AssetType::Object, raw_bundle(b"obj"));
        asset.extract();
        assert!(matches!(
            asset.read_all_bytes(),
            Err(ProviderError::TypeMismatch { requested: "bytes", .. })
        ));
        assert_eq!(*asset.object::<Bytes>().unwrap(), Bytes::from_static(b"obj"));
        assert!(asset.object::<String>().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_type_mismatch() {
        let asset = Asset::pending("raw.bin".into(), AssetType::Text, raw_bundle(&[0xff, 0xfe]));
        asset.extract();
        assert!(matches!(asset.read_text(), Err(ProviderError::TypeMismatch { .. })));
    }

    #[test]
    fn test_dispose_pending_releases_bundle() {
        let bundle = raw_bundle(b"x");
        let weak = bundle.downgrade();
        let asset = Asset::pending("raw.bin".into(), AssetType::Bytes, bundle);
        assert_eq!(weak.ref_count(), 1);

        asset.dispose();
        assert!(asset.is_completed());
        assert!(matches!(asset.error().as_deref(), Some(ProviderError::Disposed(_))));
        assert_eq!(weak.ref_count(), 0);
        assert!(asset.read_all_bytes().unwrap().is_empty());

        asset.extract();
        assert!(!asset.is_available());
    }

    #[test]
    fn test_failed_completes_synchronously() {
        let asset = Asset::failed("nope".into(), AssetType::Bytes, ProviderError::UnknownAsset("nope".into()));
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        asset.on_completed(move |a| f.set(a.error().is_some()));
        assert!(fired.get());
        assert!(asset.read_all_bytes().is_err());
    }
}
