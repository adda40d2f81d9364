use std::collections::HashMap;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::entry::OriginalSourceEntry;
use crate::entry::RecordingEntry;
use crate::entry::RecordingStatus;
use crate::entry::SourceMapEntry;
use crate::event::LogLine;
use crate::event::RecordingEvent;

/// Parses the text of a log file. Blank lines are ignored; lines that are not
/// valid events (including kinds this build does not know) are skipped with
/// a warning and counted.
pub fn parse_log(text: &str) -> (Vec<LogLine>, usize) {
    let mut lines = Vec::new();
    let mut parse_errors = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogLine>(line) {
            Ok(parsed) => lines.push(parsed),
            Err(e) => {
                warn!("failed to parse recording log line: {line:?}, error: {e}");
                parse_errors = parse_errors.saturating_add(1);
            }
        }
    }
    (lines, parse_errors)
}

/// Folds log lines into one entry per recording, ordered by creation time.
///
/// Lines are applied in kind precedence, not file order, so a plugin that
/// appends `writeFinished` before `writeStarted` still yields `onDisk`.
/// Lines of the same kind apply oldest first, with the encoded line as the
/// final tie-break, so any permutation of the same lines folds identically.
/// Events for ids without a `createRecording` line are ignored. Applying a
/// line twice changes nothing.
pub fn fold_lines(mut lines: Vec<LogLine>) -> Vec<RecordingEntry> {
    lines.sort_by_cached_key(|line| {
        (
            line.event.precedence(),
            line.timestamp,
            serde_json::to_string(line).unwrap_or_default(),
        )
    });

    let mut entries: HashMap<String, RecordingEntry> = HashMap::new();
    for LogLine {
        id,
        timestamp,
        event,
    } in lines
    {
        if let RecordingEvent::CreateRecording { runtime, build_id } = &event
            && !entries.contains_key(&id)
        {
            let entry = RecordingEntry::new(id.clone(), timestamp, runtime.clone(), build_id.clone());
            entries.insert(id, entry);
            continue;
        }
        match entries.get_mut(&id) {
            Some(entry) => apply(entry, event),
            None => trace!(id, kind = event.kind(), "ignoring event for unknown recording"),
        }
    }

    let mut entries: Vec<RecordingEntry> = entries.into_values().collect();
    entries.sort_by(|a, b| {
        a.create_time
            .cmp(&b.create_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    entries
}

fn apply(entry: &mut RecordingEntry, event: RecordingEvent) {
    match event {
        // The oldest createRecording wins.
        RecordingEvent::CreateRecording { .. } => {}
        RecordingEvent::AddMetadata { metadata } => {
            entry.metadata.extend(metadata);
        }
        RecordingEvent::WriteStarted { path } => {
            entry.path = Some(path);
            advance(entry, RecordingStatus::StartedWrite);
        }
        RecordingEvent::WriteFinished => advance(entry, RecordingStatus::OnDisk),
        RecordingEvent::UploadStarted {
            server,
            recording_id,
        } => {
            if !has_file(entry, RecordingStatus::StartedUpload) {
                return;
            }
            entry.server = Some(server);
            entry.recording_id = Some(recording_id);
            advance(entry, RecordingStatus::StartedUpload);
        }
        RecordingEvent::UploadFinished => {
            if has_file(entry, RecordingStatus::Uploaded) {
                advance(entry, RecordingStatus::Uploaded);
            }
        }
        RecordingEvent::RecordingUnusable { reason } => {
            entry.unusable_reason = Some(reason);
            advance(entry, RecordingStatus::Unusable);
        }
        RecordingEvent::Crashed => advance(entry, RecordingStatus::Crashed),
        RecordingEvent::CrashData { data } => {
            if !entry.crash_data.contains(&data) {
                entry.crash_data.push(data);
            }
        }
        RecordingEvent::CrashUploaded => advance(entry, RecordingStatus::CrashUploaded),
        RecordingEvent::SourcemapAdded {
            sourcemap_id,
            path,
            base_url,
            target_content_hash,
            target_url_hash,
            target_map_url_hash,
        } => {
            let original_sources = entry
                .sourcemaps
                .iter()
                .position(|sourcemap| sourcemap.id == sourcemap_id)
                .map(|index| entry.sourcemaps.remove(index).original_sources)
                .unwrap_or_default();
            entry.sourcemaps.push(SourceMapEntry {
                id: sourcemap_id,
                path,
                base_url,
                target_content_hash,
                target_url_hash,
                target_map_url_hash,
                original_sources,
            });
        }
        RecordingEvent::OriginalSourceAdded {
            parent_id,
            path,
            parent_offset,
        } => {
            let Some(sourcemap) = entry
                .sourcemaps
                .iter_mut()
                .find(|sourcemap| sourcemap.id == parent_id)
            else {
                warn!(
                    id = entry.id,
                    parent_id, "original source references an unknown source map"
                );
                return;
            };
            let source = OriginalSourceEntry {
                path,
                parent_offset,
            };
            if !sourcemap.original_sources.contains(&source) {
                sourcemap.original_sources.push(source);
            }
        }
    }
}

/// Only recordings with a file on disk can move into the upload states.
fn has_file(entry: &RecordingEntry, next: RecordingStatus) -> bool {
    if entry.path.is_some() {
        return true;
    }
    warn!(
        id = entry.id,
        to = %next,
        "ignoring upload event for a recording without a file"
    );
    false
}

fn advance(entry: &mut RecordingEntry, next: RecordingStatus) {
    if entry.status.can_transition_to(next) {
        entry.status = next;
    } else {
        debug!(
            id = entry.id,
            from = %entry.status,
            to = %next,
            "ignoring status change out of a final state"
        );
    }
}

#[cfg(test)]
#[path = "fold_tests.rs"]
mod tests;
