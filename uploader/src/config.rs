use std::path::Path;
use std::time::Duration;

use replay_http_client::RetryPolicy;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_SERVER: &str = "wss://dispatch.replay.io";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Retry settings as written in `config.toml`. Unset fields keep the
/// defaults of the policy they override.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RetryToml {
    pub max_attempts: Option<u64>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

impl RetryToml {
    pub fn to_policy(&self, defaults: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self
                .base_delay_ms
                .map_or(defaults.base_delay, Duration::from_millis),
            max_delay: self
                .max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
            backoff: defaults.backoff,
        }
    }
}

/// Uploader settings deserialized from `<replay dir>/config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UploaderConfigToml {
    /// Websocket address of the recording server.
    pub server: Option<String>,

    pub multipart_enabled: Option<bool>,

    /// Recordings at least this large go through multipart upload.
    pub multipart_threshold_bytes: Option<u64>,

    /// Largest part the server is asked to hand out links for.
    pub max_chunk_size_bytes: Option<u64>,

    /// How many recordings a batch uploads at once.
    pub batch_concurrency: Option<usize>,

    /// How many parts are in flight at once, across all recordings.
    pub part_concurrency: Option<usize>,

    pub rpc_timeout_ms: Option<u64>,

    #[serde(default)]
    pub request_retry: RetryToml,

    #[serde(default)]
    pub part_retry: RetryToml,
}

/// Resolved uploader settings.
#[derive(Debug, Clone, PartialEq)]
pub struct UploaderConfig {
    pub server: String,
    pub multipart_enabled: bool,
    pub multipart_threshold_bytes: u64,
    pub max_chunk_size_bytes: u64,
    pub batch_concurrency: usize,
    pub part_concurrency: usize,
    /// Upper bound on a single RPC round trip. An expired call counts as a
    /// retryable failure.
    pub rpc_timeout: Duration,
    /// Used for every server command and single-shot PUTs.
    pub request_retry: RetryPolicy,
    /// Used for each multipart part.
    pub part_retry: RetryPolicy,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            multipart_enabled: true,
            multipart_threshold_bytes: 5 * MIB,
            max_chunk_size_bytes: 5 * MIB,
            batch_concurrency: 10,
            part_concurrency: 10,
            rpc_timeout: Duration::from_secs(60),
            request_retry: RetryPolicy::exponential(
                5,
                Duration::from_millis(200),
                Duration::from_secs(10),
            ),
            part_retry: RetryPolicy::linear(5, Duration::from_secs(1), Duration::from_secs(10)),
        }
    }
}

impl UploaderConfig {
    pub fn from_toml(toml: UploaderConfigToml) -> Self {
        let defaults = Self::default();
        Self {
            server: toml.server.unwrap_or(defaults.server),
            multipart_enabled: toml.multipart_enabled.unwrap_or(defaults.multipart_enabled),
            multipart_threshold_bytes: toml
                .multipart_threshold_bytes
                .unwrap_or(defaults.multipart_threshold_bytes),
            max_chunk_size_bytes: toml
                .max_chunk_size_bytes
                .unwrap_or(defaults.max_chunk_size_bytes),
            batch_concurrency: toml
                .batch_concurrency
                .unwrap_or(defaults.batch_concurrency),
            part_concurrency: toml.part_concurrency.unwrap_or(defaults.part_concurrency),
            rpc_timeout: toml
                .rpc_timeout_ms
                .map_or(defaults.rpc_timeout, Duration::from_millis),
            request_retry: toml.request_retry.to_policy(&defaults.request_retry),
            part_retry: toml.part_retry.to_policy(&defaults.part_retry),
        }
    }

    /// Loads `config.toml` from `replay_dir`. A missing file yields the
    /// defaults.
    pub fn load(replay_dir: &Path) -> Result<Self, ConfigError> {
        let path = replay_dir.join(CONFIG_FILE_NAME);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no uploader config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        let toml = toml::from_str::<UploaderConfigToml>(&contents).map_err(|source| {
            ConfigError::Parse {
                path: path.display().to_string(),
                source,
            }
        })?;
        Ok(Self::from_toml(toml))
    }
}
