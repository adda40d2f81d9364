#![allow(clippy::expect_used, clippy::unwrap_used)]

use http::StatusCode;
use pretty_assertions::assert_eq;
use replay_http_client::HttpTransport;
use replay_http_client::Request;
use replay_http_client::ReqwestTransport;
use replay_http_client::TransportError;
use replay_http_client::build_reqwest_client;
use std::io::Write;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn transport() -> ReqwestTransport {
    ReqwestTransport::new(build_reqwest_client().expect("client"))
}

fn recording_file(contents: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(contents).expect("write");
    file.flush().expect("flush");
    file
}

#[tokio::test]
async fn put_streams_only_the_requested_file_range() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/part/2"))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"etag-2\""))
        .mount(&server)
        .await;

    let file = recording_file(b"0123456789abcdefghij");
    let url = format!("{}/part/2?X-Amz-Signature=secret", server.uri());
    let response = transport()
        .execute(Request::put(url).with_file_range(file.path(), 10, 6))
        .await
        .expect("upload should succeed");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.etag(), Some("\"etag-2\"".to_string()));

    let received = server
        .received_requests()
        .await
        .expect("should capture requests");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method, http::Method::PUT.as_str());
    assert_eq!(received[0].body, b"abcdef".to_vec());
    let content_length = received[0]
        .headers
        .get("content-length")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    assert_eq!(content_length, Some("6".to_string()));
}

#[tokio::test]
async fn non_success_status_is_a_retryable_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("slow down"))
        .mount(&server)
        .await;

    let file = recording_file(b"payload");
    let url = format!("{}/recording?X-Amz-Signature=secret", server.uri());
    let err = transport()
        .execute(Request::put(url).with_file_range(file.path(), 0, 7))
        .await
        .expect_err("503 should fail");

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert!(err.is_retryable());
    match err {
        TransportError::Http { url, body, .. } => {
            let url = url.expect("url recorded");
            assert!(!url.contains("secret"), "query leaked into {url}");
            assert_eq!(body, Some("slow down".to_string()));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn missing_file_is_a_final_body_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = transport()
        .execute(Request::put("http://127.0.0.1:9/never").with_file_range(
            dir.path().join("gone.dat"),
            0,
            1,
        ))
        .await
        .expect_err("missing file should fail");
    assert!(matches!(err, TransportError::Body(_)), "got {err:?}");
    assert!(!err.is_retryable());
}
