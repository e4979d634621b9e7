use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::{Condvar, Mutex};
use stowage_manifest::FileMeta;
use stowage_verify::{Crc16, checksum_eq};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{FetchError, HttpClient, Job, JobQueue, JobReport, Result, RetryPolicy, Throttle};

#[derive(Clone, Debug)]
pub struct WorkerOptions {
    pub name:             String,
    /// `0` is unlimited.
    pub bytes_per_second: u64,
    pub retry:            RetryPolicy,
    /// Applies to the request and to every body read.
    pub request_timeout:  Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            name:             "download".to_string(),
            bytes_per_second: 0,
            retry:            RetryPolicy::default(),
            request_timeout:  Duration::from_secs(30),
        }
    }
}

impl WorkerOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn bytes_per_second(mut self, bytes_per_second: u64) -> Self {
        self.bytes_per_second = bytes_per_second;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Default)]
struct QueueState {
    pending: JobQueue,
    active:  Option<Arc<Job>>,
    closed:  bool,
}

struct Shared {
    state:            Mutex<QueueState>,
    wake:             Condvar,
    abort:            watch::Sender<bool>,
    bytes_per_second: AtomicU64,
}

/// Background thread downloading one job at a time.
///
/// Jobs run in priority order. Completion callbacks run on the worker thread;
/// owners that need them elsewhere forward them through a channel.
pub struct DownloadWorker {
    name:   String,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl DownloadWorker {
    pub fn spawn<C: HttpClient>(client: Arc<C>, options: WorkerOptions) -> io::Result<Self> {
        let (abort, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
            abort,
            bytes_per_second: AtomicU64::new(options.bytes_per_second),
        });

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let name = options.name.clone();
        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name(format!("stowage-{name}"))
            .spawn(move || run(runtime, client, thread_shared, options))?;

        Ok(Self {
            name,
            shared,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str { &self.name }

    /// Queue a job. After [`DownloadWorker::abort`] the job completes at once
    /// with [`FetchError::Aborted`].
    pub fn enqueue(&self, job: Arc<Job>) {
        let mut state = self.shared.state.lock();
        if state.closed {
            drop(state);
            job.abort();
            return;
        }
        debug!(worker = %self.name, job = job.name(), priority = job.spec().priority, "queued");
        state.pending.push(job);
        drop(state);
        self.shared.wake.notify_one();
    }

    pub fn active_job(&self) -> Option<Arc<Job>> { self.shared.state.lock().active.clone() }

    /// Queued or running job with the given name.
    pub fn find(&self, name: &str) -> Option<Arc<Job>> {
        let state = self.shared.state.lock();
        state
            .active
            .iter()
            .find(|j| j.name() == name)
            .or_else(|| state.pending.find(name))
            .cloned()
    }

    /// Take back a queued job before it starts. A running job stays put.
    pub fn dequeue(&self, name: &str) -> Option<Arc<Job>> { self.shared.state.lock().pending.remove(name) }

    pub fn pending(&self) -> usize { self.shared.state.lock().pending.len() }

    pub fn bytes_per_second(&self) -> u64 { self.shared.bytes_per_second.load(Ordering::Relaxed) }

    /// Takes effect from the next job.
    pub fn set_bytes_per_second(&self, bytes_per_second: u64) {
        self.shared
            .bytes_per_second
            .store(bytes_per_second, Ordering::Relaxed);
    }

    /// Stop the worker. Queued and running jobs complete with
    /// [`FetchError::Aborted`].
    pub fn abort(&mut self) {
        let cleared = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.pending.drain()
        };
        for job in &cleared {
            job.abort();
        }
        self.shared.abort.send_replace(true);
        self.shared.wake.notify_all();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker = %self.name, "download thread panicked");
            }
            info!(worker = %self.name, cleared = cleared.len(), "worker stopped");
        }
    }
}

impl Drop for DownloadWorker {
    fn drop(&mut self) { self.abort(); }
}

fn run<C: HttpClient>(
    runtime: tokio::runtime::Runtime,
    client: Arc<C>,
    shared: Arc<Shared>,
    options: WorkerOptions,
) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.closed {
                    return;
                }
                if let Some(job) = state.pending.pop() {
                    state.active = Some(job.clone());
                    break job;
                }
                shared.wake.wait(&mut state);
            }
        };

        let bytes_per_second = shared.bytes_per_second.load(Ordering::Relaxed);
        job.start(bytes_per_second);
        let report = runtime.block_on(run_job(
            client.as_ref(),
            &job,
            &options,
            bytes_per_second,
            shared.abort.subscribe(),
        ));

        shared.state.lock().active = None;
        job.finish(report);
    }
}

async fn aborted(abort: &mut watch::Receiver<bool>) {
    while !*abort.borrow_and_update() {
        if abort.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_job<C: HttpClient>(
    client: &C,
    job: &Job,
    options: &WorkerOptions,
    bytes_per_second: u64,
    mut abort: watch::Receiver<bool>,
) -> JobReport {
    let spec = job.spec();
    info!(worker = %options.name, job = %spec.name, url = %spec.url, "download started");

    loop {
        let attempt = tokio::select! {
            biased;
            _ = aborted(&mut abort) => Err(FetchError::Aborted),
            result = transfer(client, job, options, bytes_per_second) => result,
        };

        let error = match attempt {
            Ok((checksum, size)) => {
                let tried = job.status().tried;
                info!(worker = %options.name, job = %spec.name, size, tried, "download finished");
                return JobReport {
                    name: spec.name.clone(),
                    final_path: spec.final_path.clone(),
                    checksum,
                    size,
                    tried,
                    error: None,
                };
            }
            Err(FetchError::Aborted) => {
                let tried = job.status().tried;
                return JobReport::failed(spec, tried, Arc::new(FetchError::Aborted));
            }
            Err(err) => Arc::new(err),
        };

        let tried = job.update(|s| {
            s.tried += 1;
            s.error = Some(error.clone());
            s.tried
        });

        if !options.retry.should_retry(tried) {
            warn!(
                worker = %options.name,
                job = %spec.name,
                tried,
                error = %error,
                "download failed, giving up"
            );
            return JobReport::failed(spec, tried, error);
        }

        warn!(
            worker = %options.name,
            job = %spec.name,
            tried,
            error = %error,
            "download failed, retrying"
        );
        tokio::select! {
            biased;
            _ = aborted(&mut abort) => {
                return JobReport::failed(spec, tried, Arc::new(FetchError::Aborted));
            }
            _ = tokio::time::sleep(options.retry.backoff) => {}
        }
    }
}

/// Checksum the existing part file and return the offset to resume from.
fn resume_state(job: &Job, hasher: &mut Crc16) -> Result<u64> {
    let spec = job.spec();
    let part = &spec.part_path;

    let file = match File::open(part) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(FetchError::io(part)(e)),
    };
    let len = file.metadata().map_err(FetchError::io(part))?.len();

    if spec.size > 0 && len > spec.size {
        debug!(job = %spec.name, len, size = spec.size, "discarding oversized part file");
        drop(file);
        stowage_fs::remove_if_exists(part).map_err(FetchError::Commit)?;
        return Ok(0);
    }

    hasher.update_reader(BufReader::new(file)).map_err(FetchError::io(part))
}

fn discard_part(job: &Job) {
    if let Err(err) = stowage_fs::remove_if_exists(&job.spec().part_path) {
        warn!(job = %job.name(), %err, "failed to delete part file");
    }
}

fn verify(job: &Job, hasher: &Crc16, written: u64) -> Result<String> {
    let spec = job.spec();
    if spec.size > 0 && written != spec.size {
        return Err(FetchError::SizeMismatch {
            expected: spec.size,
            actual:   written,
        });
    }
    let actual = hasher.hex();
    if !spec.checksum.is_empty() && !checksum_eq(&actual, &spec.checksum) {
        return Err(FetchError::ChecksumMismatch {
            expected: spec.checksum.clone(),
            actual,
        });
    }
    Ok(actual)
}

fn commit(job: &Job, checksum: &str, size: u64) -> Result<()> {
    let spec = job.spec();
    stowage_fs::replace_file(&spec.part_path, &spec.final_path).map_err(FetchError::Commit)?;
    FileMeta::new(checksum, size)
        .write(&spec.meta_path)
        .map_err(FetchError::Sidecar)
}

/// One attempt: resume, stream, verify, commit.
async fn transfer<C: HttpClient>(
    client: &C,
    job: &Job,
    options: &WorkerOptions,
    bytes_per_second: u64,
) -> Result<(String, u64)> {
    let spec = job.spec();
    let part = &spec.part_path;
    if let Some(parent) = part.parent() {
        stowage_fs::ensure_dir(parent).map_err(FetchError::Commit)?;
    }

    let mut hasher = Crc16::new();
    let mut offset = resume_state(job, &mut hasher)?;
    job.update(|s| s.bytes = offset);

    if spec.size == 0 || offset < spec.size {
        let mut headers = Vec::new();
        if offset > 0 {
            headers.push(("Range".to_string(), format!("bytes={offset}-")));
        }

        let response = tokio::time::timeout(options.request_timeout, client.get(&spec.url, &headers))
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::network)?;

        match response.status {
            206 if offset > 0 => {}
            200..=299 => {
                if offset > 0 {
                    debug!(job = %spec.name, offset, "server ignored range, restarting");
                    hasher.reset();
                    offset = 0;
                }
            }
            416 if offset > 0 => {
                discard_part(job);
                return Err(FetchError::HttpStatus {
                    status: 416,
                    url:    spec.url.clone(),
                });
            }
            status => {
                return Err(FetchError::HttpStatus {
                    status,
                    url: spec.url.clone(),
                });
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(offset > 0)
            .truncate(offset == 0)
            .open(part)
            .map_err(FetchError::io(part))?;

        let mut throttle = Throttle::new(bytes_per_second);
        let slice_len = throttle.slice_len();
        let mut written = offset;
        let mut body = response.body;

        while let Some(chunk) = tokio::time::timeout(options.request_timeout, body.next())
            .await
            .map_err(|_| FetchError::Timeout)?
        {
            let chunk = chunk.map_err(FetchError::network)?;
            for slice in chunk.chunks(slice_len) {
                file.write_all(slice).map_err(FetchError::io(part))?;
                hasher.update(slice);
                written += slice.len() as u64;
                job.update(|s| s.bytes = written);

                if spec.size > 0 && written > spec.size {
                    drop(file);
                    discard_part(job);
                    return Err(FetchError::SizeMismatch {
                        expected: spec.size,
                        actual:   written,
                    });
                }

                let delay = throttle.record(slice.len());
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        file.flush().map_err(FetchError::io(part))?;
        file.sync_all().map_err(FetchError::io(part))?;
        offset = written;
    }

    let checksum = match verify(job, &hasher, offset) {
        Ok(checksum) => checksum,
        Err(err) => {
            discard_part(job);
            return Err(err);
        }
    };
    commit(job, &checksum, offset)?;
    Ok((checksum, offset))
}
