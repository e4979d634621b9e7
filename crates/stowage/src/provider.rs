use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};
use stowage_crypt::{ChunkKey, EncryptedChunkReader};
use stowage_fetch::{
    DownloadWorker, FetchError, HttpClient, Job, JobInfo, JobReport, JobSpec, JobStatus,
    fetch_bytes, with_checksum_query,
};
use stowage_fs::{PackageLayout, atomic_write, ensure_dir};
use stowage_manifest::{
    BundleInfo, CHECKSUM_FILE, ChecksumInfo, EmbeddedManifest, LoadFlags, MANIFEST_FILE, Manifest,
    ManifestCipher, ManifestError, ManifestIndex, asset_key, decode_manifest, is_local_valid,
};
use stowage_verify::{ChecksumReader, Crc16};
use tracing::{debug, info, warn};

use crate::asset::{Asset, AssetNode, AssetType};
use crate::bundle::{Bundle, BundleNode};
use crate::container::{BundleSource, ContainerLoader, PackedContainerLoader};
use crate::filesystem::BundleFileSystem;
use crate::listener::{NoopListener, PasswordSupplier, ProviderListener};
use crate::serial::SerialQueue;
use crate::signal::Countdown;
use crate::{Lane, LoadHints, ProviderConfig, ProviderError, Result};

/// Name of the shipped-bundle listing inside the streaming root.
pub const EMBEDDED_FILE: &str = "embedded.json";

/// Outcome of comparing the installed manifest with the server's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    Latest,
    Update,
    Failed,
}

/// Result handed to the `ensure_bundles` callback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnsureSummary {
    pub scheduled: usize,
    /// Bundles whose download ultimately failed.
    pub failed:    Vec<String>,
}

impl EnsureSummary {
    pub fn is_complete(&self) -> bool { self.failed.is_empty() }
}

enum Dispatched {
    Started(JobInfo),
    Finished(JobReport),
}

type Waiter = Box<dyn FnOnce(&JobReport)>;

struct PendingDownload {
    job:     Arc<Job>,
    lane:    Lane,
    waiters: Vec<Waiter>,
}

struct Workers {
    active: DownloadWorker,
    idle:   DownloadWorker,
}

impl Workers {
    fn lane(&self, lane: Lane) -> &DownloadWorker {
        match lane {
            Lane::Active => &self.active,
            Lane::Idle => &self.idle,
        }
    }
}

/// Main-context state shared by the provider, its bundles and its assets.
pub(crate) struct Shared {
    config:                  ProviderConfig,
    layout:                  PackageLayout,
    index:                   RefCell<Option<Rc<ManifestIndex>>>,
    manifest_checksum:       RefCell<Option<ChecksumInfo>>,
    embedded:                EmbeddedManifest,
    pub(crate) bundles:      RefCell<HashMap<String, Rc<BundleNode>>>,
    assets:                  RefCell<HashMap<String, Weak<AssetNode>>>,
    downloads:               RefCell<HashMap<String, PendingDownload>>,
    workers:                 RefCell<Option<Workers>>,
    dispatch_tx:             Sender<Dispatched>,
    dispatch_rx:             Receiver<Dispatched>,
    pub(crate) bundle_queue: SerialQueue,
    asset_queue:             SerialQueue,
    pub(crate) loader:       Box<dyn ContainerLoader>,
    password:                Option<Box<dyn PasswordSupplier>>,
    listener:                Box<dyn ProviderListener>,
    closed:                  Cell<bool>,
}

impl Shared {
    fn index(&self) -> Result<Rc<ManifestIndex>> {
        self.index.borrow().clone().ok_or(ProviderError::NoManifest)
    }

    fn password(&self, name: &str) -> Result<Vec<u8>> {
        self.password
            .as_ref()
            .map(|p| p.password())
            .ok_or_else(|| ProviderError::MissingPassword(name.to_string()))
    }

    fn local_copy(&self, info: &BundleInfo) -> Option<PathBuf> {
        let path = self.layout.final_path(&info.name);
        is_local_valid(&path, self.layout.meta_path(&info.name), &info.checksum, info.size)
            .then_some(path)
    }

    fn streaming_copy(&self, info: &BundleInfo) -> Option<PathBuf> {
        let root = self.config.streaming_root.as_ref()?;
        if !self.embedded.serves(info) {
            return None;
        }
        let path = root.join(&info.name);
        path.is_file().then_some(path)
    }

    fn has_copy(&self, info: &BundleInfo) -> bool {
        self.local_copy(info).is_some() || self.streaming_copy(info).is_some()
    }

    fn open_source(&self, info: &BundleInfo, path: &Path) -> Result<BundleSource> {
        let file = BufReader::new(File::open(path).map_err(ProviderError::io(path))?);
        if !info.encrypted {
            return Ok(Box::new(file));
        }
        let key = ChunkKey::derive(&self.password(&info.name)?, &info.name);
        let chunk_size = self.index()?.manifest().chunk_size;
        Ok(Box::new(EncryptedChunkReader::new(file, key, info.plain_size(), chunk_size)))
    }

    fn load_from(&self, bundle: &Bundle, path: &Path, synchronized: bool) {
        match self.open_source(bundle.info(), path) {
            Ok(source) => bundle.load(Some(source), synchronized),
            Err(err) => {
                warn!(bundle = %bundle.name(), error = %err, "cannot open bundle");
                bundle.load(None, synchronized);
            }
        }
    }

    fn open_bundle(self: &Rc<Self>, name: &str, hints: LoadHints) -> Result<Bundle> {
        if self.closed.get() {
            return Err(ProviderError::Closed);
        }
        let cached = self.bundles.borrow().get(name).cloned();
        if let Some(node) = cached {
            return Ok(Bundle::from_node(node));
        }

        let index = self.index()?;
        let info = index
            .bundle(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownBundle(name.to_string()))?;

        let node = BundleNode::new(
            info.clone(),
            self.layout.expanded_dir(name),
            Rc::downgrade(self),
        );
        self.bundles.borrow_mut().insert(name.to_string(), node.clone());
        let bundle = Bundle::from_node(node);
        debug!(bundle = %name, dependencies = info.dependencies.len(), "bundle created");

        for dep in &info.dependencies {
            match self.open_bundle(dep, hints) {
                Ok(dep) => {
                    bundle.add_dependency(&dep);
                }
                Err(err) => warn!(bundle = %name, dependency = %dep, error = %err, "dependency unavailable"),
            }
        }

        self.acquire(&bundle, hints);
        Ok(bundle)
    }

    /// Find the bytes for a freshly created bundle: local cache, then the
    /// shipped copy, then the network.
    fn acquire(self: &Rc<Self>, bundle: &Bundle, hints: LoadHints) {
        let info = bundle.info();
        if let Some(path) = self.local_copy(info).or_else(|| self.streaming_copy(info)) {
            self.load_from(bundle, &path, hints.synchronized);
            return;
        }

        let weak = bundle.downgrade();
        let shared = Rc::downgrade(self);
        let synchronized = hints.synchronized;
        self.schedule_download(
            info,
            hints.lane,
            Box::new(move |report: &JobReport| {
                let (Some(bundle), Some(shared)) = (weak.upgrade(), shared.upgrade()) else {
                    return;
                };
                if report.is_ok() {
                    shared.load_from(&bundle, &report.final_path, synchronized);
                } else {
                    bundle.load(None, synchronized);
                }
            }),
        );
    }

    /// Queue `info` on the lane's worker, or join the download already in
    /// flight for it. Joining from the active lane pulls a job that is still
    /// waiting on the idle worker over to the active one.
    fn schedule_download(&self, info: &BundleInfo, lane: Lane, waiter: Waiter) {
        if let Some(pending) = self.downloads.borrow_mut().get_mut(&info.name) {
            pending.waiters.push(waiter);
            if lane == Lane::Active && pending.lane == Lane::Idle {
                self.promote(pending);
            }
            return;
        }

        let stamp = if info.checksum.is_empty() { ticks() } else { info.checksum.clone() };
        let url = with_checksum_query(&self.config.url_for(&info.name), &stamp);
        let spec = JobSpec::new(&info.name, url, &self.layout)
            .checksum(&info.checksum)
            .size(info.size)
            .priority(info.priority);

        if self.workers.borrow().is_none() {
            waiter(&JobReport::failed(&spec, 0, Arc::new(FetchError::Aborted)));
            return;
        }

        let (finished, started) = (self.dispatch_tx.clone(), self.dispatch_tx.clone());
        let job = Arc::new(
            Job::new(spec, move |report| {
                let _ = finished.send(Dispatched::Finished(report));
            })
            .on_start(move |info| {
                let _ = started.send(Dispatched::Started(info));
            }),
        );
        self.downloads.borrow_mut().insert(
            info.name.clone(),
            PendingDownload {
                job: job.clone(),
                lane,
                waiters: vec![waiter],
            },
        );
        if let Some(workers) = self.workers.borrow().as_ref() {
            workers.lane(lane).enqueue(job);
        }
    }

    fn promote(&self, pending: &mut PendingDownload) {
        let workers = self.workers.borrow();
        let Some(workers) = workers.as_ref() else {
            return;
        };
        if let Some(job) = workers.idle.dequeue(pending.job.name()) {
            debug!(bundle = %job.name(), "moved to the active lane");
            workers.active.enqueue(job);
            pending.lane = Lane::Active;
        }
    }

    fn install(&self, index: ManifestIndex, checksum: Option<ChecksumInfo>) -> u64 {
        let build = index.build();
        info!(build, bundles = index.bundles().len(), "manifest installed");
        *self.index.borrow_mut() = Some(Rc::new(index));
        *self.manifest_checksum.borrow_mut() = checksum;
        build
    }

    /// Verified bytes of the cached `manifest.pkg`, if it matches `info`.
    fn cached_manifest(&self, info: &ChecksumInfo) -> Option<Vec<u8>> {
        let path = self.layout.final_path(MANIFEST_FILE);
        if !is_local_valid(&path, self.layout.meta_path(MANIFEST_FILE), &info.checksum, info.size) {
            return None;
        }
        let mut reader = ChecksumReader::new(File::open(&path).ok()?, Crc16::new());
        let mut data = Vec::new();
        reader.read_to_end(&mut data).ok()?;
        match reader.finish(&info.checksum) {
            Ok(()) => Some(data),
            Err(err) => {
                warn!(error = %err, "cached manifest is corrupt");
                None
            }
        }
    }

    fn decode_and_install(&self, data: &[u8], info: ChecksumInfo) -> Result<u64> {
        let cipher = if info.is_encrypted() {
            Some(ManifestCipher::from_password(
                &self.password(MANIFEST_FILE)?,
                info.chunk_size,
            ))
        } else {
            None
        };
        let manifest = decode_manifest(data, &info, cipher.as_ref())?;
        let index = ManifestIndex::new(manifest)?;
        Ok(self.install(index, Some(info)))
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }

        let workers = self.workers.borrow_mut().take();
        drop(workers);
        while self.dispatch_rx.try_recv().is_ok() {}
        self.bundle_queue.clear();
        self.asset_queue.clear();

        let assets: Vec<_> = std::mem::take(&mut *self.assets.borrow_mut())
            .into_values()
            .filter_map(|a| a.upgrade())
            .collect();
        for node in assets {
            Asset::from_node(node).dispose();
        }

        let downloads = std::mem::take(&mut *self.downloads.borrow_mut());
        let aborted = Arc::new(FetchError::Aborted);
        for (_, pending) in downloads {
            let tried = pending.job.status().tried;
            let report = JobReport::failed(pending.job.spec(), tried, aborted.clone());
            for waiter in pending.waiters {
                waiter(&report);
            }
        }
        self.bundle_queue.clear();

        let bundles: Vec<_> = std::mem::take(&mut *self.bundles.borrow_mut())
            .into_values()
            .collect();
        for node in &bundles {
            BundleNode::force_release(node);
        }
        info!(bundles = bundles.len(), "provider closed");
    }
}

fn ticks() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

fn load_embedded(config: &ProviderConfig) -> EmbeddedManifest {
    let Some(root) = &config.streaming_root else {
        return EmbeddedManifest::default();
    };
    let path = root.join(EMBEDDED_FILE);
    let Ok(data) = std::fs::read(&path) else {
        return EmbeddedManifest::default();
    };
    serde_json::from_slice(&data).unwrap_or_else(|err| {
        warn!(path = %path.display(), error = %err, "ignoring malformed embedded listing");
        EmbeddedManifest::default()
    })
}

/// Builds a [`BundleAssetProvider`].
pub struct ProviderBuilder<C> {
    config:   ProviderConfig,
    client:   Arc<C>,
    loader:   Box<dyn ContainerLoader>,
    password: Option<Box<dyn PasswordSupplier>>,
    listener: Box<dyn ProviderListener>,
}

impl<C: HttpClient> ProviderBuilder<C> {
    pub fn new(config: ProviderConfig, client: Arc<C>) -> Self {
        Self {
            config,
            client,
            loader: Box::new(PackedContainerLoader),
            password: None,
            listener: Box::new(NoopListener),
        }
    }

    #[must_use]
    pub fn listener(mut self, listener: impl ProviderListener + 'static) -> Self {
        self.listener = Box::new(listener);
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl PasswordSupplier + 'static) -> Self {
        self.password = Some(Box::new(password));
        self
    }

    #[must_use]
    pub fn container_loader(mut self, loader: impl ContainerLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Create the local cache directory and start both download workers.
    pub fn build(self) -> Result<BundleAssetProvider<C>> {
        ensure_dir(&self.config.local_root)?;

        let active = DownloadWorker::spawn(self.client.clone(), self.config.worker_options(Lane::Active))
            .map_err(ProviderError::Spawn)?;
        let idle = DownloadWorker::spawn(self.client.clone(), self.config.worker_options(Lane::Idle))
            .map_err(ProviderError::Spawn)?;
        let (dispatch_tx, dispatch_rx) = crossbeam_channel::unbounded();

        let shared = Rc::new(Shared {
            layout: PackageLayout::new(&self.config.local_root),
            embedded: load_embedded(&self.config),
            config: self.config,
            index: RefCell::new(None),
            manifest_checksum: RefCell::new(None),
            bundles: RefCell::new(HashMap::new()),
            assets: RefCell::new(HashMap::new()),
            downloads: RefCell::new(HashMap::new()),
            workers: RefCell::new(Some(Workers { active, idle })),
            dispatch_tx,
            dispatch_rx,
            bundle_queue: SerialQueue::new(),
            asset_queue: SerialQueue::new(),
            loader: self.loader,
            password: self.password,
            listener: self.listener,
            closed: Cell::new(false),
        });
        info!(root = %shared.layout.root().display(), base_url = %shared.config.base_url, "provider started");

        Ok(BundleAssetProvider {
            shared,
            client: self.client,
        })
    }
}

/// Entry point for streaming bundles and assets on the main context.
///
/// Downloads run on two background workers. Their completions are delivered
/// by [`update`](Self::update), which the game calls once per frame; every
/// callback the provider fires runs inside that call or inside the request
/// that triggered it.
pub struct BundleAssetProvider<C> {
    shared: Rc<Shared>,
    client: Arc<C>,
}

impl<C: HttpClient> BundleAssetProvider<C> {
    pub fn new(config: ProviderConfig, client: Arc<C>) -> Result<Self> {
        ProviderBuilder::new(config, client).build()
    }

    pub fn builder(config: ProviderConfig, client: Arc<C>) -> ProviderBuilder<C> {
        ProviderBuilder::new(config, client)
    }

    pub fn config(&self) -> &ProviderConfig { &self.shared.config }

    pub fn manifest(&self) -> Option<Rc<ManifestIndex>> { self.shared.index.borrow().clone() }

    pub fn is_closed(&self) -> bool { self.shared.closed.get() }

    /// Use `manifest` as-is, without a `checksum.txt` to validate against.
    pub fn install_manifest(&self, manifest: Manifest) -> Result<u64> {
        let index = ManifestIndex::new(manifest)?;
        Ok(self.shared.install(index, None))
    }

    /// Fetch `checksum.txt` from the first base URL that answers, trying
    /// the whole list up to `attempts` times.
    async fn fetch_checksum(&self, base_urls: &[&str], attempts: u32) -> Result<(String, ChecksumInfo)> {
        let config = &self.shared.config;
        let timeout = config.request_timeout_duration();
        let attempts = attempts.max(1);
        let mut last = ProviderError::Fetch(FetchError::network("no base url"));

        for attempt in 1..=attempts {
            for base in base_urls {
                let base = base.trim_end_matches('/');
                let url = with_checksum_query(&format!("{base}/{CHECKSUM_FILE}"), &ticks());
                let fetched = fetch_bytes(&*self.client, &url, timeout)
                    .await
                    .map_err(ProviderError::from)
                    .and_then(|data| {
                        serde_json::from_slice::<ChecksumInfo>(&data)
                            .map_err(|e| ProviderError::from(ManifestError::from(e)))
                    });
                match fetched {
                    Ok(info) => return Ok((base.to_string(), info)),
                    Err(err) => {
                        warn!(url = %url, attempt, error = %err, "checksum fetch failed");
                        last = err;
                    }
                }
            }
            if attempt < attempts {
                tokio::time::sleep(config.retry_policy().backoff).await;
            }
        }
        Err(last)
    }

    /// Compare the server's `checksum.txt` with the installed manifest.
    pub async fn validate_manifest(&self, base_urls: &[&str], attempts: u32) -> ValidationResult {
        let Ok((_, remote)) = self.fetch_checksum(base_urls, attempts).await else {
            return ValidationResult::Failed;
        };
        let current = self.shared.manifest_checksum.borrow().clone();
        match current {
            Some(current)
                if current.size == remote.size
                    && stowage_verify::checksum_eq(&current.checksum, &remote.checksum) =>
            {
                ValidationResult::Latest
            }
            _ => ValidationResult::Update,
        }
    }

    /// Download (or reuse the cached copy of) the current manifest and
    /// install it. Returns its build number.
    pub async fn load_manifest(&self) -> Result<u64> {
        let config = &self.shared.config;
        let layout = &self.shared.layout;
        let (base, info) = self
            .fetch_checksum(&[config.base_url.as_str()], config.validate_retry)
            .await?;

        let data = match self.shared.cached_manifest(&info) {
            Some(data) => {
                debug!("reusing cached manifest");
                data
            }
            None => {
                let url = with_checksum_query(&format!("{base}/{MANIFEST_FILE}"), &info.checksum);
                let data = fetch_bytes(&*self.client, &url, config.request_timeout_duration()).await?;
                if data.len() as u64 != info.size {
                    return Err(FetchError::SizeMismatch {
                        expected: info.size,
                        actual:   data.len() as u64,
                    }
                    .into());
                }
                let actual = Crc16::hex_of(&data);
                if !stowage_verify::checksum_eq(&actual, &info.checksum) {
                    return Err(FetchError::ChecksumMismatch {
                        expected: info.checksum.clone(),
                        actual,
                    }
                    .into());
                }
                atomic_write(layout.final_path(MANIFEST_FILE), &data)?;
                stowage_manifest::FileMeta::new(&info.checksum, info.size)
                    .write(layout.meta_path(MANIFEST_FILE))?;
                data.to_vec()
            }
        };

        let checksum_json = serde_json::to_vec(&info).map_err(ManifestError::from)?;
        atomic_write(layout.final_path(CHECKSUM_FILE), &checksum_json)?;
        self.shared.decode_and_install(&data, info)
    }

    /// Install the manifest cached by a previous [`load_manifest`](Self::load_manifest).
    pub fn load_local_manifest(&self) -> Result<u64> {
        let layout = &self.shared.layout;
        let path = layout.final_path(CHECKSUM_FILE);
        let data = std::fs::read(&path).map_err(ProviderError::io(&path))?;
        let info: ChecksumInfo = serde_json::from_slice(&data).map_err(ManifestError::from)?;
        let data = self
            .shared
            .cached_manifest(&info)
            .ok_or_else(|| ProviderError::unavailable(MANIFEST_FILE, "no verified local copy"))?;
        self.shared.decode_and_install(&data, info)
    }

    /// Download every bundle matching `mask` that has no valid local or
    /// shipped copy, then call `on_complete` once all of them finish.
    ///
    /// Failures are collected rather than fatal; the callback always fires.
    pub fn ensure_bundles(&self, mask: LoadFlags, on_complete: impl FnOnce(&EnsureSummary) + 'static) {
        let shared = &self.shared;
        let targets: Vec<BundleInfo> = match shared.index.borrow().as_ref() {
            Some(index) if !shared.closed.get() => index
                .matching(mask)
                .filter(|b| !shared.has_copy(b))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        info!(mask = mask.bits(), count = targets.len(), "ensuring bundles");
        shared.listener.on_startup_task(targets.len());

        let summary = Rc::new(RefCell::new(EnsureSummary {
            scheduled: targets.len(),
            failed:    Vec::new(),
        }));
        let result = summary.clone();
        let latch = Countdown::new(move || on_complete(&result.borrow()));

        let lane = if mask.intersects(LoadFlags::STARTUP | LoadFlags::IMPORTANT) {
            Lane::Active
        } else {
            Lane::Idle
        };
        for info in &targets {
            latch.add();
            let (latch, summary) = (latch.clone(), summary.clone());
            shared.schedule_download(
                info,
                lane,
                Box::new(move |report: &JobReport| {
                    if !report.is_ok() {
                        summary.borrow_mut().failed.push(report.name.clone());
                    }
                    latch.signal();
                }),
            );
        }
        latch.signal();
    }

    /// Handle for the bundle called `name`, creating and loading it (and its
    /// dependencies) if it is not already live.
    pub fn get_bundle(&self, name: &str, hints: LoadHints) -> Result<Bundle> {
        self.shared.open_bundle(name, hints)
    }

    /// A live bundle, without creating one.
    pub fn try_get_bundle(&self, name: &str) -> Option<Bundle> {
        let node = self.shared.bundles.borrow().get(name).cloned()?;
        Some(Bundle::from_node(node))
    }

    /// Read-only view over an archive or file-list bundle. Other kinds get a
    /// view that fails every lookup, without loading the bundle.
    pub fn get_file_system(&self, name: &str, hints: LoadHints) -> BundleFileSystem {
        let kind = self
            .shared
            .index()
            .ok()
            .and_then(|index| index.bundle(name).map(|info| info.kind));
        if let Some(kind) = kind.filter(|k| !BundleFileSystem::supports(*k)) {
            return BundleFileSystem::unsupported(name, kind);
        }
        match self.get_bundle(name, hints) {
            Ok(bundle) => BundleFileSystem::new(bundle),
            Err(err) => BundleFileSystem::failed(name, err.to_string()),
        }
    }

    /// Handle for the asset at `path`.
    ///
    /// Requests for a path that is still alive return the same asset. An
    /// unknown path yields an asset that has already completed unavailable.
    pub fn get_asset(&self, path: &str, ty: AssetType, hints: LoadHints) -> Asset {
        let shared = &self.shared;
        let key = asset_key(path);
        if shared.closed.get() {
            return Asset::failed(key, ty, ProviderError::Closed);
        }

        let live = shared.assets.borrow().get(&key).and_then(Weak::upgrade);
        if let Some(node) = live {
            return Asset::from_node(node);
        }

        let info = match shared.index() {
            Ok(index) => index.bundle_for_asset(&key).cloned(),
            Err(err) => return Asset::failed(key, ty, err),
        };
        let Some(info) = info else {
            debug!(asset = %key, "asset not in manifest");
            return Asset::failed(key.clone(), ty, ProviderError::UnknownAsset(key));
        };
        let bundle = match shared.open_bundle(&info.name, hints) {
            Ok(bundle) => bundle,
            Err(err) => return Asset::failed(key, ty, err),
        };

        let asset = Asset::pending(key.clone(), ty, bundle.clone());
        shared.assets.borrow_mut().insert(key, asset.downgrade());

        let deferred = ty == AssetType::Object && !hints.synchronized;
        let weak = asset.downgrade();
        let owner = Rc::downgrade(shared);
        bundle.on_loaded(move || {
            let Some(node) = weak.upgrade() else {
                return;
            };
            let asset = Asset::from_node(node);
            match owner.upgrade() {
                Some(owner) if deferred => owner.asset_queue.push(move || asset.extract()),
                _ => asset.extract(),
            }
        });
        asset
    }

    /// Status of the in-flight download for `name`.
    pub fn download_status(&self, name: &str) -> Option<JobStatus> {
        self.shared.downloads.borrow().get(name).map(|d| d.job.status())
    }

    pub fn pending_downloads(&self) -> usize { self.shared.downloads.borrow().len() }

    /// Change a worker's rate limit. Applies from its next job.
    pub fn set_bytes_per_second(&self, lane: Lane, bytes_per_second: u64) {
        if let Some(workers) = self.shared.workers.borrow().as_ref() {
            workers.lane(lane).set_bytes_per_second(bytes_per_second);
        }
    }

    /// Drive the provider: deliver finished downloads and run one step each
    /// of deferred container opening and object extraction.
    pub fn update(&self) {
        let shared = &self.shared;
        while let Ok(message) = shared.dispatch_rx.try_recv() {
            match message {
                Dispatched::Started(info) => shared.listener.on_task_start(&info),
                Dispatched::Finished(report) => {
                    let pending = shared.downloads.borrow_mut().remove(&report.name);
                    match &report.error {
                        None => debug!(bundle = %report.name, tried = report.tried, "download finished"),
                        Some(err) => warn!(bundle = %report.name, tried = report.tried, error = %err, "download failed"),
                    }
                    shared.listener.on_task_complete(&report);
                    for waiter in pending.map(|p| p.waiters).unwrap_or_default() {
                        waiter(&report);
                    }
                }
            }
        }

        shared.bundle_queue.run_one();
        shared.asset_queue.run_one();
        shared.assets.borrow_mut().retain(|_, a| a.strong_count() > 0);
    }

    /// Stop the workers, dispose every live asset and release every bundle.
    ///
    /// Later requests fail with [`ProviderError::Closed`].
    pub fn close(&self) { self.shared.close(); }
}

impl<C> Drop for BundleAssetProvider<C> {
    fn drop(&mut self) { self.shared.close(); }
}
