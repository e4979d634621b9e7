use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use bytes::Bytes;
use stowage_archive::ArchiveReader;
use stowage_manifest::{BundleInfo, BundleKind, FileListing};
use tracing::{debug, trace, warn};

use crate::container::{BundleSource, Container, ContainerLoader, PackedContainerLoader};
use crate::provider::Shared;
use crate::signal::Completion;
use crate::{ProviderError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleState {
    Created,
    Loading,
    Loaded,
    Released,
}

enum Payload {
    Archive(ArchiveReader<BundleSource>),
    Container(Box<dyn Container>),
    FileList(FileListing),
    Raw(Bytes),
    Unavailable(String),
}

pub(crate) struct BundleNode {
    info:         BundleInfo,
    /// Directory file-list entries resolve against.
    file_root:    PathBuf,
    owner:        Weak<Shared>,
    refs:         Cell<usize>,
    state:        Cell<BundleState>,
    payload:      RefCell<Option<Payload>>,
    dependencies: RefCell<Vec<Bundle>>,
    /// Nodes waiting on this one; notified after `loaded` fires.
    dependents:   RefCell<Vec<Weak<BundleNode>>>,
    pending_deps: Cell<usize>,
    self_loaded:  Cell<bool>,
    loaded:       Completion,
    released:     Completion,
}

impl BundleNode {
    pub(crate) fn new(info: BundleInfo, file_root: PathBuf, owner: Weak<Shared>) -> Rc<Self> {
        Rc::new(Self {
            info,
            file_root,
            owner,
            refs: Cell::new(0),
            state: Cell::new(BundleState::Created),
            payload: RefCell::new(None),
            dependencies: RefCell::new(Vec::new()),
            dependents: RefCell::new(Vec::new()),
            pending_deps: Cell::new(0),
            self_loaded: Cell::new(false),
            loaded: Completion::new(),
            released: Completion::new(),
        })
    }

    pub(crate) fn name(&self) -> &str { &self.info.name }

    fn remove_ref(this: &Rc<Self>) {
        let refs = this.refs.get();
        if refs == 0 {
            return;
        }
        this.refs.set(refs - 1);
        if refs == 1 {
            Self::release(this);
        }
    }

    /// Release regardless of outstanding references.
    pub(crate) fn force_release(this: &Rc<Self>) {
        this.refs.set(0);
        Self::release(this);
    }

    fn release(this: &Rc<Self>) {
        if this.state.replace(BundleState::Released) == BundleState::Released {
            return;
        }

        if let Some(owner) = this.owner.upgrade() {
            let mut bundles = owner.bundles.borrow_mut();
            if bundles.get(this.name()).is_some_and(|n| Rc::ptr_eq(n, this)) {
                bundles.remove(this.name());
            }
        }

        let dependencies = std::mem::take(&mut *this.dependencies.borrow_mut());
        let payload = this.payload.borrow_mut().take();
        debug!(bundle = %this.name(), dependencies = dependencies.len(), "bundle released");

        this.released.complete();
        drop(payload);
        drop(dependencies);
    }

    fn finish_self(this: &Rc<Self>, payload: Payload) {
        if this.state.get() != BundleState::Loading {
            return;
        }
        if let Payload::Unavailable(reason) = &payload {
            warn!(bundle = %this.name(), %reason, "bundle loaded without a usable payload");
        }
        *this.payload.borrow_mut() = Some(payload);
        this.self_loaded.set(true);
        Self::try_complete(this);
    }

    fn try_complete(this: &Rc<Self>) {
        if this.state.get() != BundleState::Loading
            || !this.self_loaded.get()
            || this.pending_deps.get() != 0
        {
            return;
        }
        this.state.set(BundleState::Loaded);
        trace!(bundle = %this.name(), "bundle loaded");
        this.loaded.complete();

        let dependents = std::mem::take(&mut *this.dependents.borrow_mut());
        for dependent in dependents.iter().filter_map(Weak::upgrade) {
            dependent
                .pending_deps
                .set(dependent.pending_deps.get().saturating_sub(1));
            Self::try_complete(&dependent);
        }
    }

    fn open_container(&self, source: BundleSource) -> Payload {
        let opened = match self.owner.upgrade() {
            Some(owner) => owner.loader.open(self.name(), source),
            None => PackedContainerLoader.open(self.name(), source),
        };
        match opened {
            Ok(container) => Payload::Container(container),
            Err(err) => Payload::Unavailable(err.to_string()),
        }
    }
}

fn read_source(mut source: BundleSource) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf)?;
    Ok(buf)
}

fn parse_payload(kind: BundleKind, source: BundleSource) -> Payload {
    let parsed = match kind {
        BundleKind::ZipArchive => ArchiveReader::new(source)
            .map(Payload::Archive)
            .map_err(|e| e.to_string()),
        BundleKind::FileList => read_source(source)
            .map_err(|e| e.to_string())
            .and_then(|data| FileListing::from_slice(&data).map_err(|e| e.to_string()))
            .map(Payload::FileList),
        BundleKind::RawFile => read_source(source)
            .map(|data| Payload::Raw(Bytes::from(data)))
            .map_err(|e| e.to_string()),
        BundleKind::AssetBundle => Err("containers open through a loader".to_string()),
    };
    parsed.unwrap_or_else(Payload::Unavailable)
}

/// Counted reference to a bundle.
///
/// Cloning adds a reference and dropping removes one. When the last reference
/// goes the bundle releases its dependencies and payload and leaves the
/// provider's cache. Handles are confined to the thread that created them.
pub struct Bundle {
    node: Rc<BundleNode>,
}

impl Bundle {
    pub(crate) fn from_node(node: Rc<BundleNode>) -> Self {
        node.refs.set(node.refs.get() + 1);
        Self { node }
    }

    /// A bundle outside any provider. Containers open with the default
    /// loader and file lists resolve against `file_root`.
    pub fn detached(info: BundleInfo, file_root: impl Into<PathBuf>) -> Self {
        Self::from_node(BundleNode::new(info, file_root.into(), Weak::new()))
    }

    pub fn name(&self) -> &str { self.node.name() }

    pub fn info(&self) -> &BundleInfo { &self.node.info }

    pub fn kind(&self) -> BundleKind { self.node.info.kind }

    pub fn state(&self) -> BundleState { self.node.state.get() }

    /// Own payload parsed and every dependency loaded.
    pub fn is_loaded(&self) -> bool { self.state() == BundleState::Loaded }

    /// Loaded with a usable payload.
    pub fn is_available(&self) -> bool {
        self.is_loaded()
            && !matches!(
                *self.node.payload.borrow(),
                None | Some(Payload::Unavailable(_))
            )
    }

    pub fn ref_count(&self) -> usize { self.node.refs.get() }

    pub fn ptr_eq(&self, other: &Bundle) -> bool { Rc::ptr_eq(&self.node, &other.node) }

    pub fn downgrade(&self) -> WeakBundle { WeakBundle(Rc::downgrade(&self.node)) }

    pub(crate) fn node(&self) -> &Rc<BundleNode> { &self.node }

    pub fn dependencies(&self) -> Vec<String> {
        self.node
            .dependencies
            .borrow()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Run `f` once the bundle and all its dependencies are loaded; inline if
    /// that already happened.
    pub fn on_loaded(&self, f: impl FnOnce() + 'static) { self.node.loaded.subscribe(f); }

    pub fn on_released(&self, f: impl FnOnce() + 'static) { self.node.released.subscribe(f); }

    /// Depend on `dep`, holding a reference to it until release.
    ///
    /// Returns `false` for a self edge or an edge that already exists.
    pub fn add_dependency(&self, dep: &Bundle) -> bool {
        if self.ptr_eq(dep) || self.state() == BundleState::Released {
            return false;
        }
        if self.node.dependencies.borrow().iter().any(|d| d.ptr_eq(dep)) {
            return false;
        }
        self.node.dependencies.borrow_mut().push(dep.clone());

        if !dep.is_loaded() {
            self.node.pending_deps.set(self.node.pending_deps.get() + 1);
            dep.node.dependents.borrow_mut().push(Rc::downgrade(&self.node));
        }
        true
    }

    /// Parse the payload from `source`. Only the first call has any effect.
    ///
    /// A missing source still completes the load; reads then fail as
    /// unavailable. Engine containers open on the provider's bundle queue
    /// unless `synchronized` is set.
    pub fn load(&self, source: Option<BundleSource>, synchronized: bool) {
        if self.state() != BundleState::Created {
            return;
        }
        self.node.state.set(BundleState::Loading);

        let Some(source) = source else {
            BundleNode::finish_self(&self.node, Payload::Unavailable("no source".to_string()));
            return;
        };

        if self.kind() != BundleKind::AssetBundle {
            let payload = parse_payload(self.kind(), source);
            BundleNode::finish_self(&self.node, payload);
            return;
        }

        let owner = self.node.owner.upgrade();
        match owner {
            Some(owner) if !synchronized => {
                let node = Rc::downgrade(&self.node);
                owner.bundle_queue.push(move || {
                    if let Some(node) = node.upgrade() {
                        if node.state.get() == BundleState::Loading {
                            let payload = node.open_container(source);
                            BundleNode::finish_self(&node, payload);
                        }
                    }
                });
            }
            _ => {
                let payload = self.node.open_container(source);
                BundleNode::finish_self(&self.node, payload);
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        match &*self.node.payload.borrow() {
            Some(Payload::Archive(reader)) => reader.contains(path),
            Some(Payload::Container(container)) => container.contains(path),
            Some(Payload::FileList(listing)) => listing.find(path).is_some(),
            Some(Payload::Raw(_)) => self.info().assets.iter().any(|a| {
                stowage_manifest::asset_key(a) == stowage_manifest::asset_key(path)
            }),
            _ => false,
        }
    }

    /// Member names of an archive or file-list bundle.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = match &*self.node.payload.borrow() {
            Some(Payload::Archive(reader)) => reader.entries().map(str::to_string).collect(),
            Some(Payload::FileList(listing)) => listing.files.iter().map(|f| f.path.clone()).collect(),
            _ => Vec::new(),
        };
        names.sort();
        names
    }

    pub fn read_bytes(&self, path: &str) -> Result<Bytes> {
        let name = self.name();
        let mut payload = self.node.payload.borrow_mut();
        match payload.as_mut() {
            None => Err(ProviderError::NotLoaded(name.to_string())),
            Some(Payload::Unavailable(reason)) => Err(ProviderError::unavailable(name, reason)),
            Some(Payload::Archive(reader)) => reader
                .read(path)
                .map(Bytes::from)
                .map_err(|e| ProviderError::unavailable(name, e)),
            Some(Payload::Container(container)) => container.read_bytes(path),
            Some(Payload::Raw(bytes)) => Ok(bytes.clone()),
            Some(Payload::FileList(listing)) => {
                let entry = listing.find(path).ok_or_else(|| {
                    ProviderError::unavailable(name, format!("{path} is not in the file list"))
                })?;
                let file = self.node.file_root.join(&entry.file);
                std::fs::read(&file)
                    .map(Bytes::from)
                    .map_err(ProviderError::io(file))
            }
        }
    }

    /// Instantiate the object at `path`. Non-container bundles yield the
    /// member's [`Bytes`].
    pub fn load_object(&self, path: &str) -> Result<Rc<dyn Any>> {
        {
            let mut payload = self.node.payload.borrow_mut();
            if let Some(Payload::Container(container)) = payload.as_mut() {
                return container.load_object(path);
            }
        }
        self.read_bytes(path).map(|b| Rc::new(b) as Rc<dyn Any>)
    }
}

impl Clone for Bundle {
    fn clone(&self) -> Self { Self::from_node(self.node.clone()) }
}

impl Drop for Bundle {
    fn drop(&mut self) { BundleNode::remove_ref(&self.node); }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Uncounted observer of a bundle.
#[derive(Clone, Default)]
pub struct WeakBundle(Weak<BundleNode>);

impl WeakBundle {
    /// A counted handle, unless the bundle is gone or released.
    pub fn upgrade(&self) -> Option<Bundle> {
        let node = self.0.upgrade()?;
        if node.state.get() == BundleState::Released || node.refs.get() == 0 {
            return None;
        }
        Some(Bundle::from_node(node))
    }

    pub fn state(&self) -> BundleState {
        self.0
            .upgrade()
            .map_or(BundleState::Released, |n| n.state.get())
    }

    pub fn ref_count(&self) -> usize { self.0.upgrade().map_or(0, |n| n.refs.get()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw(name: &str) -> Bundle {
        Bundle::detached(
            BundleInfo::new(name, BundleKind::RawFile).asset(format!("{name}/asset")),
            "",
        )
    }

    fn source(data: &[u8]) -> Option<BundleSource> { Some(Box::new(Cursor::new(data.to_vec()))) }

    fn release_counter(bundle: &Bundle) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        bundle.on_released(move || c.set(c.get() + 1));
        count
    }

    #[test]
    fn test_released_exactly_once_at_zero() {
        let a = raw("a");
        let released = release_counter(&a);
        let weak = a.downgrade();

        let b = a.clone();
        let c = b.clone();
        assert_eq!(weak.ref_count(), 3);

        drop(a);
        drop(c);
        assert_eq!(released.get(), 0);
        assert_eq!(weak.state(), BundleState::Created);

        drop(b);
        assert_eq!(released.get(), 1);
        assert_eq!(weak.state(), BundleState::Released);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_dependency_edges_are_idempotent() {
        let a = raw("a");
        let b = raw("b");

        assert!(a.add_dependency(&b));
        assert!(!a.add_dependency(&b));
        assert!(!a.add_dependency(&a));
        assert_eq!(b.ref_count(), 2);
        assert_eq!(a.dependencies(), vec!["b"]);
    }

    #[test]
    fn test_release_cascades_to_dependencies() {
        let a = raw("a");
        let b = raw("b");
        let c = raw("c");
        a.add_dependency(&b);
        b.add_dependency(&c);

        let b_released = release_counter(&b);
        let c_released = release_counter(&c);
        let (wb, wc) = (b.downgrade(), c.downgrade());
        drop(b);
        drop(c);
        assert_eq!(b_released.get(), 0);
        assert_eq!(wc.ref_count(), 1);

        drop(a);
        assert_eq!(b_released.get(), 1);
        assert_eq!(c_released.get(), 1);
        assert_eq!(wb.state(), BundleState::Released);
        assert_eq!(wc.state(), BundleState::Released);
    }

    fn chain_loaded_after_dependencies(dependency_first: bool) {
        let a = raw("a");
        let b = raw("b");
        let c = raw("c");
        a.add_dependency(&b);
        b.add_dependency(&c);

        let order = Rc::new(RefCell::new(Vec::new()));
        for bundle in [&a, &b, &c] {
            let (order, name) = (order.clone(), bundle.name().to_string());
            bundle.on_loaded(move || order.borrow_mut().push(name));
        }

        a.load(source(b"a"), true);
        assert!(!a.is_loaded());

        if dependency_first {
            c.load(source(b"c"), true);
            b.load(source(b"b"), true);
        } else {
            b.load(source(b"b"), true);
            assert!(!b.is_loaded());
            c.load(source(b"c"), true);
        }

        assert!(a.is_loaded());
        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_fan_out_dependency_first() { chain_loaded_after_dependencies(true); }

    #[test]
    fn test_fan_out_dependent_first() { chain_loaded_after_dependencies(false); }

    #[test]
    fn test_diamond() {
        let top = raw("top");
        let left = raw("left");
        let right = raw("right");
        let base = raw("base");
        top.add_dependency(&left);
        top.add_dependency(&right);
        left.add_dependency(&base);
        right.add_dependency(&base);

        for b in [&top, &left, &right] {
            b.load(source(b"x"), true);
        }
        assert!(!top.is_loaded());
        base.load(source(b"x"), true);
        assert!(top.is_loaded() && left.is_loaded() && right.is_loaded());
    }

    #[test]
    fn test_missing_source_still_loads() {
        let a = raw("a");
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        a.on_loaded(move || f.set(true));

        a.load(None, true);
        assert!(fired.get());
        assert!(a.is_loaded());
        assert!(!a.is_available());
        assert!(matches!(
            a.read_bytes("a/asset"),
            Err(ProviderError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_load_is_idempotent() {
        let a = raw("a");
        a.load(source(b"first"), true);
        a.load(source(b"second"), true);
        assert_eq!(&a.read_bytes("a/asset").unwrap()[..], b"first");
        assert!(a.contains("./a/asset"));
    }

    #[test]
    fn test_corrupt_archive_is_unavailable() {
        let zip = Bundle::detached(BundleInfo::new("z.pkg", BundleKind::ZipArchive), "");
        zip.load(source(b"not a zip"), true);
        assert!(zip.is_loaded());
        assert!(!zip.is_available());
    }

    #[test]
    fn test_file_list_reads_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("click.ogg"), b"ogg!").unwrap();

        let list = Bundle::detached(BundleInfo::new("sfx.list", BundleKind::FileList), dir.path());
        list.load(
            source(br#"{"files":[{"path":"sfx/click.ogg","file":"click.ogg","size":4}]}"#),
            true,
        );

        assert!(list.is_available());
        assert_eq!(list.entries(), vec!["sfx/click.ogg"]);
        assert_eq!(&list.read_bytes("sfx/click.ogg").unwrap()[..], b"ogg!");
        assert!(list.read_bytes("sfx/none.ogg").is_err());
    }
}
