use std::path::Path;

use replay_recording_log::SourceMapEntry;
use tracing::debug;
use tracing::warn;

use crate::api::AddSourceMapParams;
use crate::api::ResourceRef;
use crate::api::ServerApi;
use crate::error::Result;
use crate::error::UploadError;

async fn read_resource(api: &ServerApi, path: &Path) -> Result<ResourceRef> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    api.upload_resource(&content).await
}

async fn upload_sourcemap(
    api: &ServerApi,
    recording_id: &str,
    sourcemap: &SourceMapEntry,
) -> Result<()> {
    let resource = read_resource(api, &sourcemap.path).await?;
    let server_id = api
        .add_source_map(&AddSourceMapParams {
            recording_id: recording_id.to_string(),
            resource,
            base_url: sourcemap.base_url.clone(),
            target_content_hash: sourcemap.target_content_hash.clone(),
            target_url_hash: sourcemap.target_url_hash.clone(),
            target_map_url_hash: sourcemap.target_map_url_hash.clone(),
        })
        .await?;
    debug!(sourcemap = %sourcemap.id, %server_id, "source map added");

    for source in &sourcemap.original_sources {
        let added = async {
            let resource = read_resource(api, &source.path).await?;
            api.add_original_source(recording_id, &resource, &server_id, source.parent_offset)
                .await
        };
        if let Err(err) = added.await {
            warn!(
                sourcemap = %sourcemap.id,
                path = %source.path.display(),
                "failed to upload original source: {err}"
            );
        }
    }
    Ok(())
}

/// Attaches every source map of a recording, and their original sources, to
/// the uploaded recording. Failures are logged and never fail the recording.
pub(crate) async fn upload_sourcemaps(
    api: &ServerApi,
    recording_id: &str,
    sourcemaps: &[SourceMapEntry],
) {
    for sourcemap in sourcemaps {
        if let Err(err) = upload_sourcemap(api, recording_id, sourcemap).await {
            warn!(
                sourcemap = %sourcemap.id,
                path = %sourcemap.path.display(),
                "failed to upload source map: {err}"
            );
        }
    }
}
