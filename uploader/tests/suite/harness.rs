#![allow(clippy::expect_used, clippy::unwrap_used)]

//! In-process stand-ins for the recording server and object storage.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use http::HeaderValue;
use http::StatusCode;
use http::header::ETAG;
use http::header::USER_AGENT;
use replay_http_client::HttpTransport;
use replay_http_client::Request;
use replay_http_client::FileRange;
use replay_http_client::Response;
use replay_http_client::RetryPolicy;
use replay_http_client::TransportError;
use replay_protocol_client::ClientError;
use replay_protocol_client::Command;
use replay_protocol_client::CommandChannel;
use replay_protocol_client::Connector;
use replay_recording_log::RecordingLog;
use replay_uploader::PassthroughValidator;
use replay_uploader::UploaderConfig;
use replay_uploader::Uploader;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

pub const MIB: u64 = 1024 * 1024;
pub const TEST_SERVER: &str = "wss://dispatch.test";
pub const STORAGE: &str = "https://storage.test";

type Handler = Box<dyn Fn(&str, &Value) -> Option<Result<Value, ClientError>> + Send + Sync>;

/// Scripted recording server. Answers every command with a plausible result
/// unless a failure, stall or handler was queued for the method.
#[derive(Default)]
pub struct FakeServer {
    calls: Mutex<Vec<(String, Value)>>,
    failures: Mutex<HashMap<String, VecDeque<ClientError>>>,
    stalls: Mutex<HashMap<String, usize>>,
    handler: Mutex<Option<Handler>>,
    connects: AtomicUsize,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, method: &str, err: ClientError) {
        self.failures
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(err);
    }

    /// The next call of `method` never gets an answer.
    pub fn stall_next(&self, method: &str) {
        *self
            .stalls
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default() += 1;
    }

    /// Overrides answers; returning `None` falls back to the defaults.
    pub fn set_handler(
        &self,
        handler: impl Fn(&str, &Value) -> Option<Result<Value, ClientError>> + Send + Sync + 'static,
    ) {
        *self.handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }

    pub fn calls_of(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(called, _)| called == method)
            .map(|(_, params)| params)
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn take_stall(&self, method: &str) -> bool {
        let mut stalls = self.stalls.lock().unwrap();
        match stalls.get_mut(method) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn respond(&self, method: &str, params: &Value) -> Result<Value, ClientError> {
        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        if let Some(handler) = self.handler.lock().unwrap().as_ref()
            && let Some(result) = handler(method, params)
        {
            return result;
        }
        Ok(default_response(method, params))
    }
}

fn recording_id_for(params: &Value) -> String {
    params["recordingId"]
        .as_str()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("rec-{}", params["buildId"].as_str().unwrap()))
}

fn default_response(method: &str, params: &Value) -> Value {
    match method {
        "Internal.beginRecordingUpload" => {
            let recording_id = recording_id_for(params);
            json!({
                "recordingId": recording_id,
                "uploadLink": format!("{STORAGE}/{recording_id}"),
            })
        }
        "Internal.beginRecordingMultipartUpload" => {
            let recording_id = recording_id_for(params);
            let length = params["length"].as_u64().unwrap();
            let chunk_size = params["maxChunkSize"].as_u64().unwrap();
            let links: Vec<String> = (0..length.div_ceil(chunk_size))
                .map(|index| format!("{STORAGE}/{recording_id}/part{index}"))
                .collect();
            json!({
                "recordingId": recording_id,
                "uploadId": format!("upload-{recording_id}"),
                "chunkSize": chunk_size,
                "partLinks": links,
            })
        }
        "Resource.token" => json!({ "token": "tok" }),
        "Resource.exists" => json!({ "exists": false }),
        "Resource.create" => json!({ "resource": { "token": "tok", "saltedHash": "sha256:salted" } }),
        "Recording.addSourceMap" => json!({ "id": "server-sm" }),
        _ => json!({}),
    }
}

struct FakeChannel {
    server: Arc<FakeServer>,
    closed: AtomicBool,
}

#[async_trait]
impl CommandChannel for FakeChannel {
    async fn send_command(&self, command: Command) -> Result<Value, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        self.server
            .calls
            .lock()
            .unwrap()
            .push((command.method.clone(), command.params.clone()));
        if self.server.take_stall(&command.method) {
            std::future::pending::<()>().await;
        }
        self.server.respond(&command.method, &command.params)
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector(pub Arc<FakeServer>);

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn CommandChannel>, ClientError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeChannel {
            server: Arc::clone(&self.0),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub url: String,
    pub offset: u64,
    pub len: u64,
    pub user_agent: Option<String>,
    pub succeeded: bool,
    /// Contents of the recording log when the PUT arrived.
    pub log_snapshot: Option<String>,
}

/// Object storage that accepts every PUT with a 200 and an ETag derived from
/// the link, unless told to fail it.
#[derive(Default)]
pub struct FakeStorage {
    puts: Mutex<Vec<RecordedPut>>,
    fail_times: Mutex<HashMap<String, usize>>,
    always_fail: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    snapshot_log: Mutex<Option<PathBuf>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `times` PUTs to `url` answer 503.
    pub fn fail_times(&self, url: &str, times: usize) {
        self.fail_times
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
    }

    /// Every PUT to a link containing `fragment` answers 503.
    pub fn always_fail(&self, fragment: &str) {
        self.always_fail.lock().unwrap().push(fragment.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn snapshot_log(&self, path: &Path) {
        *self.snapshot_log.lock().unwrap() = Some(path.to_path_buf());
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, url: &str) -> bool {
        if self
            .always_fail
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| url.contains(fragment.as_str()))
        {
            return true;
        }
        let mut fail_times = self.fail_times.lock().unwrap();
        match fail_times.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn respond(&self, request: Request) -> Response {
        let Some(FileRange { offset, len, .. }) = request.body else {
            panic!("storage PUT without a file body");
        };
        let failed = self.should_fail(&request.url);
        let log_snapshot = self
            .snapshot_log
            .lock()
            .unwrap()
            .as_ref()
            .map(|path| std::fs::read_to_string(path).unwrap_or_default());
        self.puts.lock().unwrap().push(RecordedPut {
            url: request.url.clone(),
            offset,
            len,
            user_agent: request
                .headers
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string),
            succeeded: !failed,
            log_snapshot,
        });

        if failed {
            return Response {
                status: StatusCode::SERVICE_UNAVAILABLE,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            };
        }
        let name = request.url.rsplit('/').next().unwrap_or_default();
        let mut headers = HeaderMap::new();
        headers.insert(
            ETAG,
            HeaderValue::from_str(&format!("\"etag-{name}\"")).unwrap(),
        );
        Response {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeStorage {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let response = self.respond(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}

/// Settings with short retry delays so failure paths finish quickly.
pub fn test_config() -> UploaderConfig {
    UploaderConfig {
        server: TEST_SERVER.to_string(),
        rpc_timeout: Duration::from_secs(5),
        request_retry: RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(5)),
        part_retry: RetryPolicy::linear(3, Duration::from_millis(1), Duration::from_millis(5)),
        ..UploaderConfig::default()
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub log: Arc<RecordingLog>,
    pub server: Arc<FakeServer>,
    pub storage: Arc<FakeStorage>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let log = Arc::new(RecordingLog::open(dir.path()));
        Self {
            dir,
            log,
            server: FakeServer::new(),
            storage: FakeStorage::new(),
        }
    }

    pub fn uploader(&self, config: UploaderConfig) -> Uploader {
        self.uploader_with_transport(config, Arc::clone(&self.storage) as Arc<dyn HttpTransport>)
    }

    pub fn uploader_with_transport(
        &self,
        config: UploaderConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Uploader {
        Uploader::new(
            Arc::clone(&self.log),
            Arc::new(FakeConnector(Arc::clone(&self.server))),
            transport,
            Arc::new(PassthroughValidator),
            config,
        )
    }

    /// Logs a finished recording of `size` bytes with build id `build-<id>`.
    pub async fn add_on_disk(&self, id: &str, size: u64) -> PathBuf {
        let path = self.dir.path().join(format!("recording-{id}.dat"));
        std::fs::write(&path, vec![b'r'; size as usize]).expect("write recording");
        self.log
            .create_recording(id, "chromium", &format!("build-{id}"))
            .await
            .expect("create");
        self.log.write_started(id, &path).await.expect("write started");
        let mut metadata = serde_json::Map::new();
        metadata.insert("title".to_string(), json!(format!("recording {id}")));
        self.log.add_metadata(id, metadata).await.expect("metadata");
        self.log.write_finished(id).await.expect("write finished");
        path
    }
}
