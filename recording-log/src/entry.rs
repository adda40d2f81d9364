use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

/// Phrase the capture side puts in the unusable reason of recordings that
/// captured nothing worth keeping. Such entries are hidden from listings.
pub const NO_INTERESTING_CONTENT: &str = "no interesting content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingStatus {
    Unknown,
    StartedWrite,
    OnDisk,
    StartedUpload,
    Uploaded,
    Unusable,
    Crashed,
    CrashUploaded,
}

impl RecordingStatus {
    /// Whether a status-changing event may move an entry from `self` to
    /// `next`. `unusable` and `crashUploaded` are final; a crashed recording
    /// can only become `crashUploaded`.
    pub fn can_transition_to(self, next: RecordingStatus) -> bool {
        match self {
            RecordingStatus::Unusable | RecordingStatus::CrashUploaded => false,
            RecordingStatus::Crashed => next == RecordingStatus::CrashUploaded,
            RecordingStatus::Unknown
            | RecordingStatus::StartedWrite
            | RecordingStatus::OnDisk
            | RecordingStatus::StartedUpload
            | RecordingStatus::Uploaded => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordingStatus::Unknown => "unknown",
            RecordingStatus::StartedWrite => "startedWrite",
            RecordingStatus::OnDisk => "onDisk",
            RecordingStatus::StartedUpload => "startedUpload",
            RecordingStatus::Uploaded => "uploaded",
            RecordingStatus::Unusable => "unusable",
            RecordingStatus::Crashed => "crashed",
            RecordingStatus::CrashUploaded => "crashUploaded",
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalSourceEntry {
    pub path: PathBuf,
    pub parent_offset: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapEntry {
    pub id: String,
    pub path: PathBuf,
    pub base_url: String,
    pub target_content_hash: Option<String>,
    pub target_url_hash: String,
    pub target_map_url_hash: String,
    pub original_sources: Vec<OriginalSourceEntry>,
}

/// State of one recording, rebuilt from the log on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    pub id: String,
    /// Timestamp of the `createRecording` line, in milliseconds.
    pub create_time: u64,
    pub runtime: String,
    pub build_id: String,
    pub path: Option<PathBuf>,
    pub metadata: Map<String, Value>,
    pub sourcemaps: Vec<SourceMapEntry>,
    pub crash_data: Vec<Value>,
    pub server: Option<String>,
    pub recording_id: Option<String>,
    pub status: RecordingStatus,
    pub unusable_reason: Option<String>,
}

impl RecordingEntry {
    pub(crate) fn new(id: String, create_time: u64, runtime: String, build_id: String) -> Self {
        Self {
            id,
            create_time,
            runtime,
            build_id,
            path: None,
            metadata: Map::new(),
            sourcemaps: Vec::new(),
            crash_data: Vec::new(),
            server: None,
            recording_id: None,
            status: RecordingStatus::Unknown,
            unusable_reason: None,
        }
    }

    /// Hidden entries are left out of listings unless explicitly requested.
    pub fn is_hidden(&self) -> bool {
        self.unusable_reason
            .as_deref()
            .is_some_and(|reason| reason.to_lowercase().contains(NO_INTERESTING_CONTENT))
    }

    /// Every local file this entry points at: the recording itself, its
    /// source maps and their original sources.
    pub fn asset_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = Vec::new();
        if let Some(path) = &self.path {
            paths.push(path);
        }
        for sourcemap in &self.sourcemaps {
            paths.push(&sourcemap.path);
            for source in &sourcemap.original_sources {
                paths.push(&source.path);
            }
        }
        paths
    }
}
