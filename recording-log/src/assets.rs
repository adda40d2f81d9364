use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::entry::RecordingEntry;

/// Files of `target` that none of `others` points at, in `target` order and
/// without duplicates. Deleting exactly these never takes a file away from a
/// recording that still needs it.
pub fn unreferenced_asset_paths<'a>(
    target: &RecordingEntry,
    others: impl IntoIterator<Item = &'a RecordingEntry>,
) -> Vec<PathBuf> {
    let referenced: HashSet<&Path> = others
        .into_iter()
        .filter(|other| other.id != target.id)
        .flat_map(RecordingEntry::asset_paths)
        .collect();

    let mut seen: HashSet<&Path> = HashSet::new();
    target
        .asset_paths()
        .into_iter()
        .filter(|path| !referenced.contains(path) && seen.insert(*path))
        .map(Path::to_path_buf)
        .collect()
}

/// Unlinks `paths`, returning the ones that were actually removed. Missing
/// files are not an error; other failures are logged and skipped.
pub(crate) async fn delete_files(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut removed = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed recording asset {}", path.display());
                removed.push(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("failed to remove recording asset {}: {err}", path.display()),
        }
    }
    removed
}
