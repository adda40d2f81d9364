//! Typed wrappers for the server commands the uploader issues. Every call is
//! bounded by the RPC timeout and retried under the request policy.

use std::sync::Arc;
use std::time::Duration;

use replay_http_client::RetryPolicy;
use replay_http_client::run_with_retry;
use replay_protocol_client::Command;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;
use tracing::debug;

use crate::connection::SharedConnection;
use crate::error::Result;
use crate::error::UploadError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginUploadParams {
    pub build_id: String,
    pub length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginUploadResult {
    pub recording_id: String,
    pub upload_link: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginMultipartUploadParams {
    pub build_id: String,
    pub max_chunk_size: u64,
    pub length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginMultipartUploadResult {
    pub recording_id: String,
    pub upload_id: String,
    pub chunk_size: u64,
    pub part_links: Vec<String>,
}

/// Server handle for uploaded content, obtained through the resource
/// handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub token: String,
    pub salted_hash: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSourceMapParams {
    pub recording_id: String,
    pub resource: ResourceRef,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_content_hash: Option<String>,
    #[serde(rename = "targetURLHash")]
    pub target_url_hash: String,
    #[serde(rename = "targetMapURLHash")]
    pub target_map_url_hash: String,
}

#[derive(Deserialize)]
struct TokenResult {
    token: String,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct CreateResult {
    resource: ResourceRef,
}

#[derive(Deserialize)]
struct IdResult {
    id: String,
}

pub(crate) fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

pub struct ServerApi {
    connection: Arc<SharedConnection>,
    rpc_timeout: Duration,
    retry: RetryPolicy,
}

impl ServerApi {
    pub fn new(connection: Arc<SharedConnection>, rpc_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            connection,
            rpc_timeout,
            retry,
        }
    }

    /// One attempt: the round trip, including connecting, must finish within
    /// the RPC timeout.
    async fn call_once(&self, method: &str, params: Value) -> Result<Value> {
        let attempt = async {
            let channel = self.connection.get().await?;
            Ok::<_, UploadError>(channel.send_command(Command::new(method, params)).await?)
        };
        match tokio::time::timeout(self.rpc_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::RpcTimeout {
                method: method.to_string(),
                timeout: self.rpc_timeout,
            }),
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!(method, "server command");
        run_with_retry(&self.retry, UploadError::is_retryable, |_attempt| {
            self.call_once(method, params.clone())
        })
        .await
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|err| UploadError::UnexpectedResponse {
            method: method.to_string(),
            message: err.to_string(),
        })
    }

    fn to_params(method: &str, params: &impl Serialize) -> Result<Value> {
        serde_json::to_value(params).map_err(|err| UploadError::UnexpectedResponse {
            method: method.to_string(),
            message: format!("failed to encode params: {err}"),
        })
    }

    pub async fn begin_recording_upload(
        &self,
        params: &BeginUploadParams,
    ) -> Result<BeginUploadResult> {
        let method = "Internal.beginRecordingUpload";
        self.call_as(method, Self::to_params(method, params)?).await
    }

    pub async fn begin_multipart_upload(
        &self,
        params: &BeginMultipartUploadParams,
    ) -> Result<BeginMultipartUploadResult> {
        let method = "Internal.beginRecordingMultipartUpload";
        self.call_as(method, Self::to_params(method, params)?).await
    }

    pub async fn end_recording_upload(&self, recording_id: &str) -> Result<()> {
        self.call(
            "Internal.endRecordingUpload",
            json!({ "recordingId": recording_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn end_multipart_upload(
        &self,
        recording_id: &str,
        upload_id: &str,
        part_ids: &[String],
    ) -> Result<()> {
        self.call(
            "Internal.endRecordingMultipartUpload",
            json!({
                "recordingId": recording_id,
                "uploadId": upload_id,
                "partIds": part_ids,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_recording_metadata(
        &self,
        recording_id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        self.call(
            "Recording.setRecordingMetadata",
            json!({ "recordingId": recording_id, "metadata": metadata }),
        )
        .await?;
        Ok(())
    }

    pub async fn report_crash(&self, data: &Value) -> Result<()> {
        self.call("Internal.reportCrash", json!({ "data": data }))
            .await?;
        Ok(())
    }

    /// Uploads `content` unless the server already has it.
    ///
    /// The server first hands out a token for the content hash. The salted
    /// hash proves possession of the content, and `Resource.create` only runs
    /// when the server reports it does not have it yet.
    pub async fn upload_resource(&self, content: &str) -> Result<ResourceRef> {
        let hash = format!("sha256:{}", sha256_hex(content.as_bytes()));
        let TokenResult { token } = self
            .call_as("Resource.token", json!({ "hash": hash }))
            .await?;

        let salted_hash = format!(
            "sha256:{}",
            sha256_hex(format!("{token}{content}").as_bytes())
        );
        let resource = ResourceRef { token, salted_hash };
        let ExistsResult { exists } = self
            .call_as("Resource.exists", json!({ "resource": resource }))
            .await?;
        if exists {
            debug!("resource already on server");
            return Ok(resource);
        }

        let CreateResult { resource } = self
            .call_as("Resource.create", json!({ "content": content }))
            .await?;
        Ok(resource)
    }

    /// Returns the server id of the new source map.
    pub async fn add_source_map(&self, params: &AddSourceMapParams) -> Result<String> {
        let method = "Recording.addSourceMap";
        let IdResult { id } = self
            .call_as(method, Self::to_params(method, params)?)
            .await?;
        Ok(id)
    }

    pub async fn add_original_source(
        &self,
        recording_id: &str,
        resource: &ResourceRef,
        parent_id: &str,
        parent_offset: u64,
    ) -> Result<()> {
        self.call(
            "Recording.addOriginalSource",
            json!({
                "recordingId": recording_id,
                "resource": resource,
                "parentId": parent_id,
                "parentOffset": parent_offset,
            }),
        )
        .await?;
        Ok(())
    }
}
