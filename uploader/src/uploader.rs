use std::path::Path;
use std::sync::Arc;

use replay_http_client::HttpTransport;
use replay_protocol_client::Connector;
use replay_recording_log::RecordingEntry;
use replay_recording_log::RecordingLog;
use replay_recording_log::RecordingStatus;
use replay_work_queue::JobHandle;
use replay_work_queue::WorkQueue;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::api::BeginMultipartUploadParams;
use crate::api::BeginUploadParams;
use crate::api::ServerApi;
use crate::config::UploaderConfig;
use crate::connection::SharedConnection;
use crate::eligibility::check_eligibility;
use crate::error::Result;
use crate::error::SkipReason;
use crate::error::UploadError;
use crate::metadata::MetadataValidator;
use crate::multipart::plan_parts;
use crate::multipart::upload_parts;
use crate::sourcemaps::upload_sourcemaps;
use crate::transfer::put_file;

/// Upper bound on recordings uploaded at once by [`Uploader::upload_all`].
pub const MAX_BATCH_CONCURRENCY: usize = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Return skips and failures as errors instead of logging them.
    pub strict: bool,
    /// After a successful upload, delete local files no other pending
    /// recording needs.
    pub remove_assets: bool,
}

#[derive(Debug)]
pub enum UploadOutcome {
    Uploaded { recording_id: String },
    CrashReported,
    /// Waiting to be uploaded but its file is gone. Not a failure.
    Skipped(SkipReason),
    Failed(UploadError),
}

#[derive(Debug)]
pub struct RecordingOutcome {
    pub id: String,
    pub outcome: UploadOutcome,
}

/// Per-recording results of [`Uploader::upload_all`], in log order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RecordingOutcome>,
}

impl BatchReport {
    pub fn all_ok(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|outcome| matches!(outcome.outcome, UploadOutcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &UploadError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.outcome {
            UploadOutcome::Failed(err) => Some((outcome.id.as_str(), err)),
            UploadOutcome::Uploaded { .. }
            | UploadOutcome::CrashReported
            | UploadOutcome::Skipped(_) => None,
        })
    }
}

enum Completed {
    Recording(String),
    Crash,
}

enum BatchSlot {
    Queued(JobHandle<Result<Completed>>),
    Skipped(SkipReason),
}

struct Inner {
    log: Arc<RecordingLog>,
    connection: Arc<SharedConnection>,
    api: ServerApi,
    transport: Arc<dyn HttpTransport>,
    validator: Arc<dyn MetadataValidator>,
    config: UploaderConfig,
    /// Shared by every recording so the part limit holds across a batch.
    part_queue: WorkQueue,
}

/// Uploads recordings from a [`RecordingLog`] to the recording server.
///
/// Cloning is cheap; clones share the server connection and the part queue.
#[derive(Clone)]
pub struct Uploader {
    inner: Arc<Inner>,
}

impl Uploader {
    pub fn new(
        log: Arc<RecordingLog>,
        connector: Arc<dyn Connector>,
        transport: Arc<dyn HttpTransport>,
        validator: Arc<dyn MetadataValidator>,
        config: UploaderConfig,
    ) -> Self {
        let connection = Arc::new(SharedConnection::new(connector));
        let api = ServerApi::new(
            Arc::clone(&connection),
            config.rpc_timeout,
            config.request_retry.clone(),
        );
        let part_queue = WorkQueue::new(config.part_concurrency);
        Self {
            inner: Arc::new(Inner {
                log,
                connection,
                api,
                transport,
                validator,
                config,
                part_queue,
            }),
        }
    }

    pub fn log(&self) -> &RecordingLog {
        &self.inner.log
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.inner.config
    }

    /// Uploads one recording and returns its server id.
    ///
    /// Crashed recordings only have their crash data reported and yield
    /// `None`. Without `strict`, a recording that is skipped or fails also
    /// yields `None` after a warning.
    pub async fn upload_recording(&self, id: &str, options: UploadOptions) -> Result<Option<String>> {
        match self.upload_one(id, options).await {
            Ok(Completed::Recording(recording_id)) => Ok(Some(recording_id)),
            Ok(Completed::Crash) => Ok(None),
            Err(err) if options.strict => Err(err),
            Err(err) => {
                warn!(id, "recording not uploaded: {err}");
                Ok(None)
            }
        }
    }

    /// Uploads every eligible recording accepted by `filter`, running at most
    /// `concurrency` (clamped to `1..=MAX_BATCH_CONCURRENCY`) at once.
    ///
    /// Recordings waiting for upload whose file is missing are reported as
    /// skipped. Recordings that are settled (uploaded, unusable, crash
    /// reported) or not yet written are left out of the report.
    pub async fn upload_all(
        &self,
        filter: Option<&(dyn Fn(&RecordingEntry) -> bool + Sync)>,
        concurrency: usize,
        options: UploadOptions,
    ) -> Result<BatchReport> {
        let concurrency = concurrency.clamp(1, MAX_BATCH_CONCURRENCY);
        let queue = WorkQueue::new(concurrency);
        let mut slots: Vec<(String, BatchSlot)> = Vec::new();
        for entry in self.inner.log.entries(true).await? {
            if let Some(filter) = filter
                && !filter(&entry)
            {
                continue;
            }
            match check_eligibility(&entry).await {
                Ok(()) => {}
                Err(reason @ (SkipReason::NoPath | SkipReason::FileMissing(_))) => {
                    warn!(id = %entry.id, "skipping recording: {reason}");
                    slots.push((entry.id, BatchSlot::Skipped(reason)));
                    continue;
                }
                Err(reason) => {
                    debug!(id = %entry.id, "not uploading: {reason}");
                    continue;
                }
            }
            let uploader = self.clone();
            let id = entry.id.clone();
            let handle = queue.add(move || async move { uploader.upload_one(&id, options).await });
            slots.push((entry.id, BatchSlot::Queued(handle)));
        }
        info!(recordings = slots.len(), concurrency, "uploading recordings");

        let mut report = BatchReport::default();
        for (id, slot) in slots {
            let handle = match slot {
                BatchSlot::Queued(handle) => handle,
                BatchSlot::Skipped(reason) => {
                    report.outcomes.push(RecordingOutcome {
                        id,
                        outcome: UploadOutcome::Skipped(reason),
                    });
                    continue;
                }
            };
            let outcome = match handle.await {
                Ok(Ok(Completed::Recording(recording_id))) => UploadOutcome::Uploaded { recording_id },
                Ok(Ok(Completed::Crash)) => UploadOutcome::CrashReported,
                Ok(Err(err)) => {
                    warn!(id = %id, "recording upload failed: {err}");
                    UploadOutcome::Failed(err)
                }
                Err(aborted) => {
                    warn!(id = %id, "recording upload aborted");
                    UploadOutcome::Failed(aborted.into())
                }
            };
            report.outcomes.push(RecordingOutcome { id, outcome });
        }
        Ok(report)
    }

    /// Releases the server connection. Later uploads reconnect.
    pub async fn close(&self) {
        self.inner.connection.close().await;
    }

    async fn upload_one(&self, id: &str, options: UploadOptions) -> Result<Completed> {
        let entry = self
            .inner
            .log
            .find(id)
            .await?
            .ok_or_else(|| UploadError::UnknownRecording(id.to_string()))?;

        if entry.status == RecordingStatus::Uploaded
            && let Some(recording_id) = &entry.recording_id
        {
            debug!(id, %recording_id, "recording already uploaded");
            return Ok(Completed::Recording(recording_id.clone()));
        }

        check_eligibility(&entry)
            .await
            .map_err(|reason| UploadError::Skipped {
                id: id.to_string(),
                reason,
            })?;

        if entry.status == RecordingStatus::Crashed {
            self.report_crash(&entry).await?;
            return Ok(Completed::Crash);
        }

        let metadata = self
            .inner
            .validator
            .validate(&entry.metadata)
            .map_err(UploadError::InvalidMetadata)?;
        let Some(path) = entry.path.as_deref() else {
            return Err(UploadError::Skipped {
                id: id.to_string(),
                reason: SkipReason::NoPath,
            });
        };
        let length = tokio::fs::metadata(path)
            .await
            .map_err(|source| UploadError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let config = &self.inner.config;
        let recording_id = if config.multipart_enabled && length >= config.multipart_threshold_bytes
        {
            self.upload_multipart(&entry, path, length, &metadata).await?
        } else {
            self.upload_single(&entry, path, length, &metadata).await?
        };

        upload_sourcemaps(&self.inner.api, &recording_id, &entry.sourcemaps).await;
        self.inner.log.upload_finished(id).await?;
        info!(id, %recording_id, length, "recording uploaded");

        if options.remove_assets {
            match self.inner.log.remove_assets(id).await {
                Ok(removed) => debug!(id, removed = removed.len(), "removed recording assets"),
                Err(err) => warn!(id, "failed to remove recording assets: {err}"),
            }
        }
        Ok(Completed::Recording(recording_id))
    }

    async fn upload_single(
        &self,
        entry: &RecordingEntry,
        path: &Path,
        length: u64,
        metadata: &Map<String, Value>,
    ) -> Result<String> {
        let api = &self.inner.api;
        let begin = api
            .begin_recording_upload(&BeginUploadParams {
                build_id: entry.build_id.clone(),
                length,
                recording_id: entry.recording_id.clone(),
            })
            .await?;
        self.mark_started(entry, &begin.recording_id, metadata).await?;

        put_file(
            self.inner.transport.as_ref(),
            &begin.upload_link,
            path,
            length,
            &self.inner.config.request_retry,
        )
        .await?;
        api.end_recording_upload(&begin.recording_id).await?;
        Ok(begin.recording_id)
    }

    async fn upload_multipart(
        &self,
        entry: &RecordingEntry,
        path: &Path,
        length: u64,
        metadata: &Map<String, Value>,
    ) -> Result<String> {
        let api = &self.inner.api;
        let begin = api
            .begin_multipart_upload(&BeginMultipartUploadParams {
                build_id: entry.build_id.clone(),
                max_chunk_size: self.inner.config.max_chunk_size_bytes,
                length,
                recording_id: entry.recording_id.clone(),
            })
            .await?;
        let parts = plan_parts(length, begin.chunk_size, &begin.part_links)?;
        self.mark_started(entry, &begin.recording_id, metadata).await?;

        debug!(id = %entry.id, parts = parts.len(), chunk_size = begin.chunk_size, "multipart upload");
        let etags = upload_parts(
            &self.inner.part_queue,
            parts,
            path,
            &self.inner.transport,
            &self.inner.config.part_retry,
        )
        .await?;
        api.end_multipart_upload(&begin.recording_id, &begin.upload_id, &etags)
            .await?;
        Ok(begin.recording_id)
    }

    /// Sends the metadata and records `uploadStarted`; both happen before any
    /// recording bytes leave the machine.
    async fn mark_started(
        &self,
        entry: &RecordingEntry,
        recording_id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        self.inner
            .api
            .set_recording_metadata(recording_id, metadata)
            .await?;
        self.inner
            .log
            .upload_started(&entry.id, &self.inner.config.server, recording_id)
            .await?;
        Ok(())
    }

    async fn report_crash(&self, entry: &RecordingEntry) -> Result<()> {
        for data in &entry.crash_data {
            self.inner.api.report_crash(data).await?;
        }
        self.inner.log.crash_uploaded(&entry.id).await?;
        info!(id = %entry.id, reports = entry.crash_data.len(), "crash reported");
        Ok(())
    }
}
