use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// One line of `recordings.log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    /// Local id of the recording the event concerns.
    pub id: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: u64,
    #[serde(flatten)]
    pub event: RecordingEvent,
}

impl LogLine {
    pub fn new(id: impl Into<String>, event: RecordingEvent) -> Self {
        Self {
            id: id.into(),
            timestamp: now_millis(),
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecordingEvent {
    CreateRecording {
        runtime: String,
        build_id: String,
    },
    AddMetadata {
        metadata: Map<String, Value>,
    },
    WriteStarted {
        path: PathBuf,
    },
    WriteFinished,
    UploadStarted {
        server: String,
        recording_id: String,
    },
    UploadFinished,
    RecordingUnusable {
        reason: String,
    },
    Crashed,
    CrashData {
        data: Value,
    },
    CrashUploaded,
    SourcemapAdded {
        sourcemap_id: String,
        path: PathBuf,
        base_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_content_hash: Option<String>,
        target_url_hash: String,
        target_map_url_hash: String,
    },
    OriginalSourceAdded {
        /// Id of the source map this source belongs to.
        parent_id: String,
        path: PathBuf,
        parent_offset: u64,
    },
}

impl RecordingEvent {
    /// Position in the fold order. Lower values are applied first.
    pub fn precedence(&self) -> u8 {
        match self {
            RecordingEvent::CreateRecording { .. } => 0,
            RecordingEvent::AddMetadata { .. } => 1,
            RecordingEvent::WriteStarted { .. } => 2,
            RecordingEvent::SourcemapAdded { .. } => 3,
            RecordingEvent::OriginalSourceAdded { .. } => 4,
            RecordingEvent::WriteFinished => 5,
            RecordingEvent::UploadStarted { .. } => 6,
            RecordingEvent::UploadFinished => 7,
            RecordingEvent::RecordingUnusable { .. } => 8,
            RecordingEvent::Crashed => 9,
            RecordingEvent::CrashData { .. } => 10,
            RecordingEvent::CrashUploaded => 11,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecordingEvent::CreateRecording { .. } => "createRecording",
            RecordingEvent::AddMetadata { .. } => "addMetadata",
            RecordingEvent::WriteStarted { .. } => "writeStarted",
            RecordingEvent::SourcemapAdded { .. } => "sourcemapAdded",
            RecordingEvent::OriginalSourceAdded { .. } => "originalSourceAdded",
            RecordingEvent::WriteFinished => "writeFinished",
            RecordingEvent::UploadStarted { .. } => "uploadStarted",
            RecordingEvent::UploadFinished => "uploadFinished",
            RecordingEvent::RecordingUnusable { .. } => "recordingUnusable",
            RecordingEvent::Crashed => "crashed",
            RecordingEvent::CrashData { .. } => "crashData",
            RecordingEvent::CrashUploaded => "crashUploaded",
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
