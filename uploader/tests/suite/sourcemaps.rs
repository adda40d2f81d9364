#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use replay_protocol_client::ClientError;
use replay_protocol_client::ProtocolError;
use replay_recording_log::RecordingEvent;
use replay_recording_log::RecordingStatus;
use replay_uploader::UploadOptions;
use serde_json::json;

use super::harness::Fixture;
use super::harness::test_config;

const STRICT: UploadOptions = UploadOptions {
    strict: true,
    remove_assets: false,
};

async fn add_sourcemap(fixture: &Fixture, id: &str, map: &Path, original: Option<&Path>) {
    fixture
        .log
        .append(
            id,
            RecordingEvent::SourcemapAdded {
                sourcemap_id: "local-sm".to_string(),
                path: map.to_path_buf(),
                base_url: "https://app.example.com/main.js".to_string(),
                target_content_hash: Some("content".to_string()),
                target_url_hash: "url".to_string(),
                target_map_url_hash: "map-url".to_string(),
            },
        )
        .await
        .expect("sourcemap");
    if let Some(original) = original {
        fixture
            .log
            .append(
                id,
                RecordingEvent::OriginalSourceAdded {
                    parent_id: "local-sm".to_string(),
                    path: original.to_path_buf(),
                    parent_offset: 3,
                },
            )
            .await
            .expect("original source");
    }
}

fn write(fixture: &Fixture, name: &str, contents: &str) -> PathBuf {
    let path = fixture.dir.path().join(name);
    std::fs::write(&path, contents).expect("write");
    path
}

#[tokio::test]
async fn source_maps_go_through_the_resource_handshake() {
    let fixture = Fixture::new();
    fixture.add_on_disk("a", 256).await;
    let map = write(&fixture, "main.js.map", r#"{"version":3}"#);
    let original = write(&fixture, "main.ts", "export const x = 1;");
    add_sourcemap(&fixture, "a", &map, Some(&original)).await;
    let uploader = fixture.uploader(test_config());

    uploader.upload_recording("a", STRICT).await.expect("upload");

    assert_eq!(
        fixture.server.methods(),
        vec![
            "Internal.beginRecordingUpload",
            "Recording.setRecordingMetadata",
            "Internal.endRecordingUpload",
            "Resource.token",
            "Resource.exists",
            "Resource.create",
            "Recording.addSourceMap",
            "Resource.token",
            "Resource.exists",
            "Resource.create",
            "Recording.addOriginalSource",
        ]
    );
    assert_eq!(
        fixture.server.calls_of("Resource.create")[0],
        json!({ "content": r#"{"version":3}"# })
    );
    let token_hash = fixture.server.calls_of("Resource.token")[0]["hash"]
        .as_str()
        .expect("hash")
        .to_string();
    assert!(token_hash.starts_with("sha256:"));
    assert_eq!(
        fixture.server.calls_of("Recording.addSourceMap"),
        vec![json!({
            "recordingId": "rec-build-a",
            "resource": { "token": "tok", "saltedHash": "sha256:salted" },
            "baseURL": "https://app.example.com/main.js",
            "targetContentHash": "content",
            "targetURLHash": "url",
            "targetMapURLHash": "map-url",
        })]
    );
    assert_eq!(
        fixture.server.calls_of("Recording.addOriginalSource"),
        vec![json!({
            "recordingId": "rec-build-a",
            "resource": { "token": "tok", "saltedHash": "sha256:salted" },
            "parentId": "server-sm",
            "parentOffset": 3,
        })]
    );
}

#[tokio::test]
async fn known_resources_are_not_created_again() {
    let fixture = Fixture::new();
    fixture.add_on_disk("a", 256).await;
    let map = write(&fixture, "main.js.map", "{}");
    add_sourcemap(&fixture, "a", &map, None).await;
    fixture.server.set_handler(|method, _| {
        (method == "Resource.exists").then(|| Ok(json!({ "exists": true })))
    });
    let uploader = fixture.uploader(test_config());

    uploader.upload_recording("a", STRICT).await.expect("upload");

    assert!(fixture.server.calls_of("Resource.create").is_empty());
    let exists = fixture.server.calls_of("Resource.exists");
    let salted = exists[0]["resource"]["saltedHash"].as_str().expect("salted");
    assert!(salted.starts_with("sha256:"));
    assert_eq!(fixture.server.calls_of("Recording.addSourceMap").len(), 1);
}

#[tokio::test]
async fn source_map_failures_do_not_fail_the_recording() {
    let fixture = Fixture::new();
    fixture.add_on_disk("a", 256).await;
    let missing = fixture.dir.path().join("missing.map");
    add_sourcemap(&fixture, "a", &missing, None).await;
    fixture.add_on_disk("b", 256).await;
    let map = write(&fixture, "b.js.map", "{}");
    add_sourcemap(&fixture, "b", &map, None).await;
    fixture.server.fail_next(
        "Recording.addSourceMap",
        ClientError::Protocol(ProtocolError {
            code: 49,
            message: "authentication required".to_string(),
            data: None,
        }),
    );
    let uploader = fixture.uploader(test_config());

    let a = uploader.upload_recording("a", STRICT).await.expect("a");
    let b = uploader.upload_recording("b", STRICT).await.expect("b");
    assert_eq!(a.as_deref(), Some("rec-build-a"));
    assert_eq!(b.as_deref(), Some("rec-build-b"));
    for id in ["a", "b"] {
        assert_eq!(
            fixture.log.find(id).await.expect("read").expect("entry").status,
            RecordingStatus::Uploaded
        );
    }
    // The missing map never reached the server; b's map was attempted once.
    assert_eq!(fixture.server.calls_of("Recording.addSourceMap").len(), 1);
}
