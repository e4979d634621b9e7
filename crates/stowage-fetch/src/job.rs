use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use stowage_fs::PackageLayout;

use crate::FetchError;

/// What to download and where it lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpec {
    pub name:       String,
    pub url:        String,
    /// Expected checksum; empty when unknown.
    pub checksum:   String,
    /// Expected size; `0` when unknown.
    pub size:       u64,
    pub priority:   i32,
    pub final_path: PathBuf,
    pub part_path:  PathBuf,
    pub meta_path:  PathBuf,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, layout: &PackageLayout) -> Self {
        let name = name.into();
        Self {
            final_path: layout.final_path(&name),
            part_path: layout.part_path(&name),
            meta_path: layout.meta_path(&name),
            url: url.into(),
            checksum: String::new(),
            size: 0,
            priority: 0,
            name,
        }
    }

    #[must_use]
    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    #[must_use]
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Live progress of a job.
#[derive(Clone, Debug, Default)]
pub struct JobStatus {
    /// Bytes present in the part file, including resumed ones.
    pub bytes:            u64,
    /// Failed attempts so far.
    pub tried:            u32,
    pub error:            Option<Arc<FetchError>>,
    pub is_running:       bool,
    pub is_done:          bool,
    pub bytes_per_second: u64,
}

/// Snapshot handed to observers when a job starts.
#[derive(Clone, Debug)]
pub struct JobInfo {
    pub spec:   JobSpec,
    pub status: JobStatus,
}

/// Outcome of a finished job.
#[derive(Clone, Debug)]
pub struct JobReport {
    pub name:       String,
    pub final_path: PathBuf,
    /// Checksum of the committed file, or the expected one on failure.
    pub checksum:   String,
    pub size:       u64,
    pub tried:      u32,
    pub error:      Option<Arc<FetchError>>,
}

impl JobReport {
    pub fn is_ok(&self) -> bool { self.error.is_none() }

    pub fn failed(spec: &JobSpec, tried: u32, error: Arc<FetchError>) -> Self {
        Self {
            name: spec.name.clone(),
            final_path: spec.final_path.clone(),
            checksum: spec.checksum.clone(),
            size: spec.size,
            tried,
            error: Some(error),
        }
    }
}

pub type JobCallback = Box<dyn FnOnce(JobReport) + Send>;
pub type StartCallback = Box<dyn FnOnce(JobInfo) + Send>;

/// A queued download. Shared between the owner and the worker running it.
pub struct Job {
    spec:        JobSpec,
    status:      Mutex<JobStatus>,
    on_start:    Mutex<Option<StartCallback>>,
    on_complete: Mutex<Option<JobCallback>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("spec", &self.spec)
            .field("status", &*self.status.lock())
            .finish_non_exhaustive()
    }
}

impl Job {
    pub fn new(spec: JobSpec, on_complete: impl FnOnce(JobReport) + Send + 'static) -> Self {
        Self {
            spec,
            status: Mutex::new(JobStatus::default()),
            on_start: Mutex::new(None),
            on_complete: Mutex::new(Some(Box::new(on_complete))),
        }
    }

    #[must_use]
    pub fn on_start(self, f: impl FnOnce(JobInfo) + Send + 'static) -> Self {
        *self.on_start.lock() = Some(Box::new(f));
        self
    }

    pub fn spec(&self) -> &JobSpec { &self.spec }

    pub fn name(&self) -> &str { &self.spec.name }

    pub fn status(&self) -> JobStatus { self.status.lock().clone() }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            spec:   self.spec.clone(),
            status: self.status(),
        }
    }

    pub fn is_done(&self) -> bool { self.status.lock().is_done }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut JobStatus) -> R) -> R {
        f(&mut self.status.lock())
    }

    pub(crate) fn start(&self, bytes_per_second: u64) {
        self.update(|s| {
            s.is_running = true;
            s.bytes_per_second = bytes_per_second;
        });
        let callback = self.on_start.lock().take();
        if let Some(callback) = callback {
            callback(self.info());
        }
    }

    /// Mark the job done and fire its callback. Later calls are no-ops.
    pub(crate) fn finish(&self, report: JobReport) {
        self.update(|s| {
            s.is_running = false;
            s.is_done = true;
            s.tried = report.tried;
            s.error = report.error.clone();
            if report.is_ok() {
                s.bytes = report.size;
            }
        });
        let callback = self.on_complete.lock().take();
        if let Some(callback) = callback {
            callback(report);
        }
    }

    pub(crate) fn abort(&self) {
        let tried = self.status.lock().tried;
        self.finish(JobReport::failed(&self.spec, tried, Arc::new(FetchError::Aborted)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_spec_paths() {
        let layout = PackageLayout::new("/cache");
        let spec = JobSpec::new("b1.pkg", "http://cdn/b1.pkg", &layout)
            .checksum("bb3d")
            .size(9)
            .priority(2);
        assert_eq!(spec.part_path, PathBuf::from("/cache/b1.pkg.part"));
        assert_eq!(spec.meta_path, PathBuf::from("/cache/b1.pkg.meta"));
        assert_eq!(spec.priority, 2);
    }

    #[test]
    fn test_callback_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let job = Job::new(
            JobSpec::new("x", "http://cdn/x", &PackageLayout::new("/tmp")),
            move |report| {
                assert!(report.error.as_deref().is_some_and(FetchError::is_aborted));
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        job.abort();
        job.abort();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(job.is_done());
    }
}
