use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::{FetchError, Result};

/// Upper bound on buffer space reserved up front from a `Content-Length`.
const PREALLOC_LIMIT: u64 = 1 << 20;

pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Status line and streaming body of a GET.
pub struct HttpResponse<E> {
    pub status:         u16,
    pub content_length: Option<u64>,
    pub body:           BoxStream<'static, std::result::Result<Bytes, E>>,
}

impl<E> HttpResponse<E> {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

/// Minimal asynchronous HTTP client.
///
/// Non-2xx statuses are returned as responses, not errors; callers decide
/// what a 206 or 416 means for them.
pub trait HttpClient: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

/// GET `url` into memory. Any non-2xx status is an error.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str, timeout: Duration) -> Result<Bytes> {
    let response = tokio::time::timeout(timeout, client.get(url, &[]))
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::network)?;

    if !response.is_success() {
        return Err(FetchError::HttpStatus {
            status: response.status,
            url:    url.to_string(),
        });
    }

    let reserve = response.content_length.unwrap_or(0).min(PREALLOC_LIMIT);
    let mut buf = BytesMut::with_capacity(reserve as usize);
    let mut body = response.body;
    while let Some(chunk) = tokio::time::timeout(timeout, body.next())
        .await
        .map_err(|_| FetchError::Timeout)?
    {
        buf.extend_from_slice(&chunk.map_err(FetchError::network)?);
    }
    Ok(buf.freeze())
}

/// Append a cache-busting `checksum` query parameter.
pub fn with_checksum_query(url: &str, value: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}checksum={value}")
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;

    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl Default for ReqwestClient {
        fn default() -> Self { Self::new() }
    }

    impl ReqwestClient {
        pub fn new() -> Self {
            Self {
                client: reqwest::Client::new(),
            }
        }

        pub fn with_client(client: reqwest::Client) -> Self { Self { client } }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse<Self::Error>, Self::Error> {
            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(key.as_str(), value.as_str());
            }

            let response = request.send().await?;
            Ok(HttpResponse {
                status:         response.status().as_u16(),
                content_length: response.content_length(),
                body:           Box::pin(response.bytes_stream()),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_checksum_query() {
        assert_eq!(
            with_checksum_query("http://cdn/b1.pkg", "bb3d"),
            "http://cdn/b1.pkg?checksum=bb3d"
        );
        assert_eq!(
            with_checksum_query("http://cdn/b1.pkg?v=1", "bb3d"),
            "http://cdn/b1.pkg?v=1&checksum=bb3d"
        );
    }
}
