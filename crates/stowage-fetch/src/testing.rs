//! In-memory [`HttpClient`] for tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use bytes::Bytes;
use futures_util::stream;
use parking_lot::Mutex;

use crate::{HttpClient, HttpResponse};

#[derive(Debug, thiserror::Error)]
#[error("mock transport error: {0}")]
pub struct MockError(pub String);

/// A failure injected into the next request for a URL.
#[derive(Clone, Debug)]
pub enum MockFailure {
    /// Reply with this status and an empty body.
    Status(u16),
    /// Fail before any response.
    Network,
    /// Send the first `n` body bytes, then fail.
    Truncate(usize),
    /// Send the whole body under this `Content-Length`.
    ClaimLength(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockRequest {
    pub url:         String,
    pub range_start: Option<u64>,
}

#[derive(Default)]
struct MockState {
    files:        HashMap<String, Bytes>,
    failures:     HashMap<String, VecDeque<MockFailure>>,
    requests:     Vec<MockRequest>,
    ignore_range: bool,
    chunk_size:   usize,
}

/// Serves registered files by URL, ignoring the query string.
///
/// Honours `Range: bytes=N-` with a 206 unless told to ignore ranges. Unknown
/// URLs answer 404.
#[derive(Default)]
pub struct MockClient {
    state: Mutex<MockState>,
}

fn strip_query(url: &str) -> &str { url.split_once('?').map_or(url, |(base, _)| base) }

fn parse_range(headers: &[(String, String)]) -> Option<u64> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("range"))
        .and_then(|(_, v)| v.strip_prefix("bytes="))
        .and_then(|v| v.trim_end_matches('-').parse().ok())
}

impl MockClient {
    pub fn new() -> Self { Self::default() }

    pub fn serve(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.state.lock().files.insert(url.into(), data.into());
    }

    pub fn remove(&self, url: &str) { self.state.lock().files.remove(url); }

    /// Queue a failure for the next request to `url`. Queued failures are
    /// consumed in order, one per request.
    pub fn fail_next(&self, url: impl Into<String>, failure: MockFailure) {
        self.state
            .lock()
            .failures
            .entry(url.into())
            .or_default()
            .push_back(failure);
    }

    pub fn ignore_range(&self, ignore: bool) { self.state.lock().ignore_range = ignore; }

    /// Split bodies into chunks of this many bytes.
    pub fn chunk_size(&self, size: usize) { self.state.lock().chunk_size = size; }

    pub fn requests(&self) -> Vec<MockRequest> { self.state.lock().requests.clone() }

    pub fn request_count(&self, url: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    fn respond(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse<MockError>, MockError> {
        let mut state = self.state.lock();
        let url = strip_query(url).to_string();
        let range_start = parse_range(headers);
        state.requests.push(MockRequest {
            url: url.clone(),
            range_start,
        });

        let failure = state.failures.get_mut(&url).and_then(VecDeque::pop_front);
        let (truncate, claimed) = match failure {
            Some(MockFailure::Network) => return Err(MockError(format!("connection reset: {url}"))),
            Some(MockFailure::Status(status)) => return Ok(empty(status)),
            Some(MockFailure::Truncate(n)) => (Some(n), None),
            Some(MockFailure::ClaimLength(n)) => (None, Some(n)),
            None => (None, None),
        };

        let Some(data) = state.files.get(&url).cloned() else {
            return Ok(empty(404));
        };

        let (status, body) = match range_start {
            Some(start) if !state.ignore_range => {
                if start > data.len() as u64 {
                    return Ok(empty(416));
                }
                (206, data.slice(start as usize..))
            }
            _ => (200, data),
        };

        let chunk = match state.chunk_size {
            0 => 1024,
            n => n,
        };
        let content_length = claimed.or(Some(body.len() as u64));
        let cut = truncate.map_or(body.len(), |n| n.min(body.len()));
        let mut items: Vec<Result<Bytes, MockError>> = (0..cut)
            .step_by(chunk)
            .map(|at| Ok(body.slice(at..(at + chunk).min(cut))))
            .collect();
        if truncate.is_some() {
            items.push(Err(MockError(format!("body truncated: {url}"))));
        }

        Ok(HttpResponse {
            status,
            content_length,
            body: Box::pin(stream::iter(items)),
        })
    }
}

fn empty(status: u16) -> HttpResponse<MockError> {
    HttpResponse {
        status,
        content_length: Some(0),
        body: Box::pin(stream::empty()),
    }
}

impl HttpClient for MockClient {
    type Error = MockError;

    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send {
        let result = self.respond(url, headers);
        async move { result }
    }
}
