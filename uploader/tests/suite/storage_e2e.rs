#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use replay_http_client::ReqwestTransport;
use replay_uploader::UploadError;
use replay_uploader::UploadOptions;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::header_exists;
use wiremock::matchers::method;
use wiremock::matchers::path;

use super::harness::Fixture;
use super::harness::test_config;

const STRICT: UploadOptions = UploadOptions {
    strict: true,
    remove_assets: false,
};

fn point_uploads_at(fixture: &Fixture, storage: &MockServer) {
    let link = format!("{}/upload/rec-a", storage.uri());
    fixture.server.set_handler(move |method, _| {
        (method == "Internal.beginRecordingUpload")
            .then(|| Ok(json!({ "recordingId": "rec-a", "uploadLink": link.clone() })))
    });
}

#[tokio::test]
async fn recording_bytes_reach_storage_over_http() {
    let storage = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/upload/rec-a"))
        .and(header("content-length", "1024"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&storage)
        .await;

    let fixture = Fixture::new();
    fixture.add_on_disk("a", 1024).await;
    point_uploads_at(&fixture, &storage);
    let uploader = fixture.uploader_with_transport(
        test_config(),
        Arc::new(ReqwestTransport::new(reqwest::Client::new())),
    );

    let recording_id = uploader.upload_recording("a", STRICT).await.expect("upload");
    assert_eq!(recording_id.as_deref(), Some("rec-a"));

    let requests = storage.received_requests().await.expect("requests");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, vec![b'r'; 1024]);
}

#[tokio::test]
async fn non_200_success_codes_are_failures() {
    let storage = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/upload/rec-a"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&storage)
        .await;

    let fixture = Fixture::new();
    fixture.add_on_disk("a", 16).await;
    point_uploads_at(&fixture, &storage);
    let uploader = fixture.uploader_with_transport(
        test_config(),
        Arc::new(ReqwestTransport::new(reqwest::Client::new())),
    );

    let err = uploader
        .upload_recording("a", STRICT)
        .await
        .expect_err("201 is not accepted");
    assert!(matches!(err, UploadError::Transport(_)), "{err:?}");
    assert!(
        fixture
            .server
            .calls_of("Internal.endRecordingUpload")
            .is_empty()
    );
}
