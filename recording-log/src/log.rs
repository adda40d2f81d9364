use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::assets::delete_files;
use crate::assets::unreferenced_asset_paths;
use crate::entry::RecordingEntry;
use crate::entry::RecordingStatus;
use crate::error::RecordingLogError;
use crate::error::Result;
use crate::event::LogLine;
use crate::event::RecordingEvent;
use crate::fold::fold_lines;
use crate::fold::parse_log;

pub const LOG_FILE_NAME: &str = "recordings.log";

/// The append-only `recordings.log` in a recordings directory.
///
/// All writes, including the rewrite done by [`RecordingLog::remove`], go
/// through one async mutex. Reads take a snapshot of the file and fold it.
#[derive(Debug)]
pub struct RecordingLog {
    dir: PathBuf,
    path: PathBuf,
    writer: Mutex<()>,
}

impl RecordingLog {
    /// Does no IO; the directory and file are created on first append.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(LOG_FILE_NAME);
        Self {
            dir,
            path,
            writer: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line and flushes it before returning.
    pub async fn append(&self, id: &str, event: RecordingEvent) -> Result<()> {
        let line = LogLine::new(id, event);
        let mut json = serde_json::to_string(&line)?;
        json.push('\n');

        let _guard = self.writer.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        trace!(id, kind = line.event.kind(), "appended recording log line");
        Ok(())
    }

    pub async fn create_recording(&self, id: &str, runtime: &str, build_id: &str) -> Result<()> {
        self.append(
            id,
            RecordingEvent::CreateRecording {
                runtime: runtime.to_string(),
                build_id: build_id.to_string(),
            },
        )
        .await
    }

    pub async fn add_metadata(&self, id: &str, metadata: Map<String, Value>) -> Result<()> {
        self.append(id, RecordingEvent::AddMetadata { metadata }).await
    }

    pub async fn write_started(&self, id: &str, path: impl Into<PathBuf>) -> Result<()> {
        self.append(id, RecordingEvent::WriteStarted { path: path.into() })
            .await
    }

    pub async fn write_finished(&self, id: &str) -> Result<()> {
        self.append(id, RecordingEvent::WriteFinished).await
    }

    pub async fn upload_started(&self, id: &str, server: &str, recording_id: &str) -> Result<()> {
        self.append(
            id,
            RecordingEvent::UploadStarted {
                server: server.to_string(),
                recording_id: recording_id.to_string(),
            },
        )
        .await
    }

    pub async fn upload_finished(&self, id: &str) -> Result<()> {
        self.append(id, RecordingEvent::UploadFinished).await
    }

    pub async fn recording_unusable(&self, id: &str, reason: &str) -> Result<()> {
        self.append(
            id,
            RecordingEvent::RecordingUnusable {
                reason: reason.to_string(),
            },
        )
        .await
    }

    pub async fn crashed(&self, id: &str) -> Result<()> {
        self.append(id, RecordingEvent::Crashed).await
    }

    pub async fn crash_data(&self, id: &str, data: Value) -> Result<()> {
        self.append(id, RecordingEvent::CrashData { data }).await
    }

    pub async fn crash_uploaded(&self, id: &str) -> Result<()> {
        self.append(id, RecordingEvent::CrashUploaded).await
    }

    async fn read_text(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn fold_all(&self) -> Result<Vec<RecordingEntry>> {
        let text = self.read_text().await?;
        let (lines, parse_errors) = parse_log(&text);
        debug!(
            "read {} recording log lines from {}, parse errors: {}",
            lines.len(),
            self.path.display(),
            parse_errors,
        );
        Ok(fold_lines(lines))
    }

    /// Current state of every recording, oldest first. Entries that captured
    /// nothing of interest are left out unless `include_hidden` is set.
    pub async fn entries(&self, include_hidden: bool) -> Result<Vec<RecordingEntry>> {
        let mut entries = self.fold_all().await?;
        if !include_hidden {
            entries.retain(|entry| !entry.is_hidden());
        }
        Ok(entries)
    }

    /// Looks up one recording, hidden or not.
    pub async fn find(&self, id: &str) -> Result<Option<RecordingEntry>> {
        Ok(self
            .fold_all()
            .await?
            .into_iter()
            .find(|entry| entry.id == id))
    }

    /// Drops every line about `id` from the log, then deletes the files only
    /// that recording referenced. Returns the deleted files.
    pub async fn remove(&self, id: &str) -> Result<Vec<PathBuf>> {
        let _guard = self.writer.lock().await;

        let text = self.read_text().await?;
        let (lines, _) = parse_log(&text);
        let entries = fold_lines(lines);
        let Some(target) = entries.iter().find(|entry| entry.id == id) else {
            return Err(RecordingLogError::UnknownRecording(id.to_string()));
        };
        let orphaned = unreferenced_asset_paths(target, &entries);

        let kept: Vec<&str> = text
            .lines()
            .filter(|line| !line.trim().is_empty() && line_id(line).as_deref() != Some(id))
            .collect();
        self.rewrite(&kept).await?;
        info!(id, "removed recording from log");

        Ok(delete_files(orphaned).await)
    }

    /// Deletes every recording's files and empties the log.
    pub async fn remove_all(&self) -> Result<Vec<PathBuf>> {
        let _guard = self.writer.lock().await;

        let text = self.read_text().await?;
        let (lines, _) = parse_log(&text);
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fold_lines(lines) {
            for path in entry.asset_paths() {
                if !paths.iter().any(|known| known == path) {
                    paths.push(path.to_path_buf());
                }
            }
        }

        self.rewrite(&[]).await?;
        info!("removed all recordings from log");
        Ok(delete_files(paths).await)
    }

    /// Deletes the files of an uploaded recording that no recording still
    /// awaiting upload needs. The log itself is left alone.
    pub async fn remove_assets(&self, id: &str) -> Result<Vec<PathBuf>> {
        let entries = self.fold_all().await?;
        let Some(target) = entries.iter().find(|entry| entry.id == id) else {
            return Err(RecordingLogError::UnknownRecording(id.to_string()));
        };
        let still_needed = entries.iter().filter(|entry| {
            !matches!(
                entry.status,
                RecordingStatus::Uploaded | RecordingStatus::CrashUploaded
            )
        });
        let orphaned = unreferenced_asset_paths(target, still_needed);
        Ok(delete_files(orphaned).await)
    }

    /// Replaces the log with `lines`, each newline-terminated. Callers hold
    /// the writer lock.
    async fn rewrite(&self, lines: &[&str]) -> Result<()> {
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.path.with_extension("log.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct LineId {
    id: String,
}

/// Id of a raw log line, if it has one. Lines that fail to parse as events
/// still count for removal as long as their id is readable.
fn line_id(line: &str) -> Option<String> {
    serde_json::from_str::<LineId>(line)
        .ok()
        .map(|line| line.id)
}
