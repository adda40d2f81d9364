//! Uploads recordings from the local recording log to the Replay server.
//!
//! Server commands go over one shared protocol connection; recording bytes
//! go straight to object storage through an [`replay_http_client::HttpTransport`],
//! either as a single PUT or as parts uploaded in parallel.

mod api;
mod config;
mod connection;
mod eligibility;
mod error;
mod metadata;
mod multipart;
mod part_worker;
mod sourcemaps;
mod transfer;
mod uploader;

pub use crate::api::AddSourceMapParams;
pub use crate::api::BeginMultipartUploadParams;
pub use crate::api::BeginMultipartUploadResult;
pub use crate::api::BeginUploadParams;
pub use crate::api::BeginUploadResult;
pub use crate::api::ResourceRef;
pub use crate::api::ServerApi;
pub use crate::config::CONFIG_FILE_NAME;
pub use crate::config::ConfigError;
pub use crate::config::DEFAULT_SERVER;
pub use crate::config::RetryToml;
pub use crate::config::UploaderConfig;
pub use crate::config::UploaderConfigToml;
pub use crate::connection::SharedConnection;
pub use crate::eligibility::check_eligibility;
pub use crate::error::Result;
pub use crate::error::SkipReason;
pub use crate::error::UploadError;
pub use crate::metadata::MetadataValidator;
pub use crate::metadata::PassthroughValidator;
pub use crate::multipart::PartPlan;
pub use crate::multipart::plan_parts;
pub use crate::uploader::BatchReport;
pub use crate::uploader::MAX_BATCH_CONCURRENCY;
pub use crate::uploader::RecordingOutcome;
pub use crate::uploader::UploadOptions;
pub use crate::uploader::UploadOutcome;
pub use crate::uploader::Uploader;
