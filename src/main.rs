//! S3 Transfer Facade - memory-aware S3 uploads and downloads
//!
//! Command-line front end over the transfer facade.
//!
//! Free memory is read from the host on Linux only. On other platforms it is
//! reported as zero: uploads go multipart and `download` requires `--dest`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use s3_transfer_facade::config::Config;
use s3_transfer_facade::facade::TransferFacade;
use s3_transfer_facade::logging;
use s3_transfer_facade::memory::SystemMemoryProbe;
use s3_transfer_facade::metrics;
use s3_transfer_facade::s3::S3Client;
use s3_transfer_facade::store::ObjectMetadata;
use s3_transfer_facade::transfer::plan::{checked_plan, PartBoundary, PART_SIZE};
use s3_transfer_facade::transfer::{DownloadPayload, DownloadRequest, UploadRequest};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// S3 Transfer Facade - picks single-shot or multipart uploads and
/// in-memory or file-backed downloads from available memory
#[derive(Parser, Debug)]
#[command(name = "s3-transfer-facade")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file
    Upload {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        file: PathBuf,
        /// User metadata entry as key=value (repeatable)
        #[arg(long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download an object
    Download {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
        /// Destination file. Written under either delivery; without it an
        /// in-memory body goes to stdout and a large object is an error
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Print the multipart part plan for a payload size
    Plan {
        #[arg(long)]
        size: u64,
        /// Use the legacy part boundary
        #[arg(long)]
        legacy: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => Config::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
        config.validate()?;
    }

    logging::init_subscriber(&config.logging)?;
    info!("Starting S3 Transfer Facade v{}", s3_transfer_facade::VERSION);

    let result = run(args.command, &config).await;

    if args.metrics {
        eprintln!("{}", metrics::gather_text());
    }

    result
}

async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Plan { size, legacy } => {
            let boundary = if legacy {
                PartBoundary::Legacy
            } else {
                PartBoundary::Tiled
            };
            let parts = checked_plan(size, PART_SIZE, boundary)?;
            let output = json!({
                "size": size,
                "part_size": PART_SIZE,
                "boundary": boundary,
                "part_count": parts.len(),
                "parts": parts,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Upload {
            bucket,
            key,
            file,
            meta,
            content_type,
        } => {
            let facade = build_facade(config).await?;

            let mut request = UploadRequest::new(bucket, key, file);
            if !meta.is_empty() || content_type.is_some() {
                let mut metadata = ObjectMetadata::new();
                metadata.content_type = content_type;
                metadata.user_metadata.extend(meta);
                request = request.with_metadata(metadata);
            }

            let outcome = facade.upload(&request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Download { bucket, key, dest } => {
            let facade = build_facade(config).await?;

            let mut request = DownloadRequest::new(bucket, key);
            if let Some(dest) = &dest {
                request = request.with_destination(dest);
            }

            let response = facade.download(&request).await?;
            let delivery = if response.payload.is_file_backed() {
                "file_backed"
            } else {
                "in_memory"
            };

            match (&dest, &response.payload) {
                (Some(dest), payload) => {
                    let bytes = payload.save_to(dest).await?;
                    let output = json!({
                        "delivery": delivery,
                        "destination": dest,
                        "bytes": bytes,
                        "metadata": response.metadata,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                (None, DownloadPayload::InMemory(data)) => {
                    info!(delivery, bytes = data.len(), "Writing object body to stdout");
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(data).await?;
                    stdout.flush().await?;
                }
                (None, DownloadPayload::File(path)) => {
                    anyhow::bail!("Object was saved to unexpected file {:?}", path);
                }
            }
        }
    }

    Ok(())
}

async fn build_facade(config: &Config) -> anyhow::Result<TransferFacade<S3Client, SystemMemoryProbe>> {
    let client = S3Client::new((&config.s3).into()).await?;
    info!(region = client.region(), "S3 client ready");
    Ok(TransferFacade::new(
        Arc::new(client),
        SystemMemoryProbe::new(),
        &config.transfer,
    ))
}
