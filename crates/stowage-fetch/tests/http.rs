use std::time::Duration;

use stowage_fetch::testing::{MockClient, MockFailure};
use stowage_fetch::{FetchError, HttpClient, fetch_bytes};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_fetch_bytes() {
    let client = MockClient::new();
    client.chunk_size(3);
    client.serve("http://cdn.test/checksum.txt", &b"{\"size\":1}"[..]);

    let body = fetch_bytes(&client, "http://cdn.test/checksum.txt?checksum=123", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(&body[..], b"{\"size\":1}");
    assert_eq!(client.request_count("http://cdn.test/checksum.txt"), 1);
}

#[tokio::test]
async fn test_fetch_bytes_status_error() {
    let client = MockClient::new();
    let err = fetch_bytes(&client, "http://cdn.test/missing", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_fetch_bytes_network_error() {
    let client = MockClient::new();
    client.serve("http://cdn.test/a", &b"abc"[..]);
    client.fail_next("http://cdn.test/a", MockFailure::Network);

    let err = fetch_bytes(&client, "http://cdn.test/a", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
    assert_eq!(&fetch_bytes(&client, "http://cdn.test/a", TIMEOUT).await.unwrap()[..], b"abc");
}

#[tokio::test]
async fn test_fetch_bytes_oversized_content_length() {
    let client = MockClient::new();
    client.serve("http://cdn.test/checksum.txt", &b"{}"[..]);
    client.fail_next("http://cdn.test/checksum.txt", MockFailure::ClaimLength(u64::MAX));

    let body = fetch_bytes(&client, "http://cdn.test/checksum.txt", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(&body[..], b"{}");
}

#[tokio::test]
async fn test_mock_range_reply() {
    let client = MockClient::new();
    client.serve("http://cdn.test/a", &b"0123456789"[..]);

    let headers = [("Range".to_string(), "bytes=4-".to_string())];
    let response = client.get("http://cdn.test/a", &headers).await.unwrap();
    assert_eq!(response.status, 206);
    assert_eq!(response.content_length, Some(6));

    let past_end = [("Range".to_string(), "bytes=11-".to_string())];
    assert_eq!(client.get("http://cdn.test/a", &past_end).await.unwrap().status, 416);
}
