use stowage_fetch::{JobInfo, JobReport};

/// Observer for download activity, for progress UI and telemetry.
///
/// Every method runs on the main context from [`BundleAssetProvider::update`]
/// or the call that triggered it.
///
/// [`BundleAssetProvider::update`]: crate::BundleAssetProvider::update
pub trait ProviderListener {
    /// `ensure_bundles` scheduled `count` downloads.
    fn on_startup_task(&self, _count: usize) {}

    fn on_task_start(&self, _info: &JobInfo) {}

    fn on_task_complete(&self, _report: &JobReport) {}
}

#[derive(Debug, Default)]
pub struct NoopListener;

impl ProviderListener for NoopListener {}

/// Supplies the shared password for encrypted bundles.
pub trait PasswordSupplier {
    fn password(&self) -> Vec<u8>;
}

impl<F: Fn() -> Vec<u8>> PasswordSupplier for F {
    fn password(&self) -> Vec<u8> { self() }
}
