use replay_recording_log::RecordingEntry;
use replay_recording_log::RecordingStatus;

use crate::error::SkipReason;

/// Decides whether `entry` can be handed to the uploader.
///
/// Crashed recordings are always eligible because only their crash data is
/// sent. Everything else needs a recording file that is still on disk.
pub async fn check_eligibility(entry: &RecordingEntry) -> Result<(), SkipReason> {
    match entry.status {
        RecordingStatus::Crashed => Ok(()),
        RecordingStatus::OnDisk | RecordingStatus::StartedWrite | RecordingStatus::StartedUpload => {
            let Some(path) = entry.path.as_ref() else {
                return Err(SkipReason::NoPath);
            };
            match tokio::fs::try_exists(path).await {
                Ok(true) => Ok(()),
                Ok(false) | Err(_) => Err(SkipReason::FileMissing(path.clone())),
            }
        }
        RecordingStatus::Unusable => Err(SkipReason::Unusable(
            entry.unusable_reason.clone().unwrap_or_default(),
        )),
        RecordingStatus::Unknown | RecordingStatus::Uploaded | RecordingStatus::CrashUploaded => {
            Err(SkipReason::Status(entry.status))
        }
    }
}
