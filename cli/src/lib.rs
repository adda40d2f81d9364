mod credentials;
mod list;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use replay_http_client::ReqwestTransport;
use replay_http_client::build_reqwest_client;
use replay_protocol_client::WebSocketConnector;
use replay_recording_log::RecordingLog;
use replay_uploader::PassthroughValidator;
use replay_uploader::UploadOptions;
use replay_uploader::UploadOutcome;
use replay_uploader::Uploader;
use replay_uploader::UploaderConfig;
use replay_utils_home_dir::find_replay_dir;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub use crate::credentials::API_KEY_ENV_VAR;
pub use crate::credentials::EnvCredentials;

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Manage and upload the recordings in the local Replay directory.
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "replay")]
pub struct Cli {
    /// Websocket address of the recording server. Overrides `server` from
    /// `config.toml`.
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// List recordings in the recording log.
    Ls(LsArgs),

    /// Upload one recording.
    Upload(UploadArgs),

    /// Upload every recording that is ready to upload.
    UploadAll(UploadAllArgs),

    /// Remove a recording from the log and delete its files.
    Rm(RmArgs),

    /// Remove every recording and delete all recording files.
    RmAll,
}

#[derive(Debug, clap::Parser)]
pub struct LsArgs {
    /// Include recordings that captured nothing of interest.
    #[arg(long)]
    pub all: bool,

    /// Output the recordings as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Parser)]
pub struct UploadArgs {
    /// Id of the recording in the local log.
    pub id: String,

    /// Fail instead of warning when the recording cannot be uploaded.
    #[arg(long)]
    pub strict: bool,

    /// Delete the local files once the upload finished.
    #[arg(long)]
    pub remove_assets: bool,
}

#[derive(Debug, clap::Parser)]
pub struct UploadAllArgs {
    /// How many recordings to upload at once. Defaults to
    /// `batch_concurrency` from `config.toml`.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Delete the local files of each recording once it is uploaded.
    #[arg(long)]
    pub remove_assets: bool,
}

#[derive(Debug, clap::Parser)]
pub struct RmArgs {
    /// Id of the recording to remove.
    pub id: String,
}

/// Logs go to stderr so stdout stays parseable; `RUST_LOG` overrides the
/// default level.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

/// Runs one command. Returns `false` when the process should exit with a
/// failure status without an error of its own to report.
pub async fn run_main(cli: Cli) -> anyhow::Result<bool> {
    let Cli { server, command } = cli;
    let replay_dir = find_replay_dir().context("failed to locate the replay directory")?;
    let log = Arc::new(RecordingLog::open(&replay_dir));

    match command {
        Command::Ls(args) => {
            list::run_ls(&log, args).await?;
            Ok(true)
        }
        Command::Rm(args) => {
            let deleted = log.remove(&args.id).await?;
            println!(
                "Removed recording {} and {} file(s).",
                args.id,
                deleted.len()
            );
            Ok(true)
        }
        Command::RmAll => {
            let deleted = log.remove_all().await?;
            println!("Removed all recordings and {} file(s).", deleted.len());
            Ok(true)
        }
        Command::Upload(args) => {
            let uploader = build_uploader(&replay_dir, log, server)?;
            let result = uploader
                .upload_recording(
                    &args.id,
                    UploadOptions {
                        strict: args.strict,
                        remove_assets: args.remove_assets,
                    },
                )
                .await;
            uploader.close().await;
            match result {
                Ok(Some(recording_id)) => {
                    println!("Uploaded recording {} as {recording_id}.", args.id);
                    Ok(true)
                }
                Ok(None) => {
                    println!("Recording {} was not uploaded.", args.id);
                    Ok(true)
                }
                Err(err) => {
                    eprintln!("Failed to upload recording {}: {err}", args.id);
                    Ok(false)
                }
            }
        }
        Command::UploadAll(args) => {
            let uploader = build_uploader(&replay_dir, log, server)?;
            let concurrency = args
                .concurrency
                .unwrap_or(uploader.config().batch_concurrency);
            let report = uploader
                .upload_all(
                    None,
                    concurrency,
                    UploadOptions {
                        strict: false,
                        remove_assets: args.remove_assets,
                    },
                )
                .await;
            uploader.close().await;
            let report = report?;

            if report.outcomes.is_empty() {
                println!("No recordings to upload.");
            }
            for outcome in &report.outcomes {
                match &outcome.outcome {
                    UploadOutcome::Uploaded { recording_id } => {
                        println!("{}: uploaded as {recording_id}", outcome.id);
                    }
                    UploadOutcome::CrashReported => println!("{}: crash reported", outcome.id),
                    UploadOutcome::Skipped(reason) => {
                        println!("{}: skipped: {reason}", outcome.id);
                    }
                    UploadOutcome::Failed(err) => println!("{}: failed: {err}", outcome.id),
                }
            }
            Ok(report.all_ok())
        }
    }
}

fn build_uploader(
    replay_dir: &Path,
    log: Arc<RecordingLog>,
    server: Option<String>,
) -> anyhow::Result<Uploader> {
    let mut config = UploaderConfig::load(replay_dir)?;
    if let Some(server) = server {
        config.server = server;
    }
    let client = build_reqwest_client().context("failed to build HTTP client")?;
    let connector = WebSocketConnector::new(config.server.clone(), Arc::new(EnvCredentials));
    Ok(Uploader::new(
        log,
        Arc::new(connector),
        Arc::new(ReqwestTransport::new(client)),
        Arc::new(PassthroughValidator),
        config,
    ))
}
