//! Bundle downloads on background workers.
//!
//! A [`DownloadWorker`] owns one thread and a priority queue of [`Job`]s. Each
//! job resumes from its `.part` file with a range request, streams to disk in
//! rate-limited slices while checksumming, verifies size and checksum, then
//! moves the file into place and writes its `.meta` sidecar. Failed attempts
//! are retried after a fixed backoff until the [`RetryPolicy`] ceiling.

mod error;
mod http;
mod job;
mod queue;
mod retry;
mod throttle;
mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{BoxError, FetchError, Result};
pub use http::{BoxStream, HttpClient, HttpResponse, fetch_bytes, with_checksum_query};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use job::{Job, JobCallback, JobInfo, JobReport, JobSpec, JobStatus, StartCallback};
pub use queue::JobQueue;
pub use retry::RetryPolicy;
pub use throttle::{Throttle, UNLIMITED_SLICE, delay_for};
pub use worker::{DownloadWorker, WorkerOptions};
