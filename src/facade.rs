//! Transfer facade
//!
//! Entry point for callers: measures the source, asks the strategy selector
//! for a plan and hands the transfer to the matching handler.
//!
//! `SystemMemoryProbe` only reads host memory on Linux. Elsewhere it reports
//! zero, so uploads always go multipart and downloads always need a
//! destination; pass a `FixedMemoryProbe` to pick the paths explicitly.
//!
//! # Example
//!
//! ```no_run
//! use s3_transfer_facade::config::TransferConfig;
//! use s3_transfer_facade::facade::TransferFacade;
//! use s3_transfer_facade::memory::SystemMemoryProbe;
//! use s3_transfer_facade::s3::{S3Client, S3ClientConfig};
//! use s3_transfer_facade::transfer::{DownloadRequest, UploadRequest};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::new(S3ClientConfig {
//!     region: "us-east-1".into(),
//!     ..Default::default()
//! })
//! .await?;
//! let facade = TransferFacade::new(Arc::new(client), SystemMemoryProbe::new(), &TransferConfig::default());
//!
//! let outcome = facade
//!     .upload(&UploadRequest::new("my-bucket", "videos/big.mp4", "/data/big.mp4"))
//!     .await?;
//! println!("Stored: {}", outcome.succeeded());
//!
//! let response = facade
//!     .download(&DownloadRequest::new("my-bucket", "videos/big.mp4").with_destination("/tmp/big.mp4"))
//!     .await?;
//! println!("File backed: {}", response.payload.is_file_backed());
//! # Ok(())
//! # }
//! ```

use crate::config::TransferConfig;
use crate::memory::MemoryProbe;
use crate::metrics;
use crate::store::{ObjectMetadata, ObjectStore};
use crate::strategy::{Delivery, StrategySelector, UploadStrategy};
use crate::transfer::download::DownloadHandler;
use crate::transfer::multipart::MultipartHandler;
use crate::transfer::put_object::PutObjectHandler;
use crate::transfer::{
    DownloadRequest, DownloadResponse, TransferError, UploadOutcome, UploadRequest,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Memory-aware transfer facade
///
/// Holds no mutable state; share it behind an `Arc` to run transfers
/// concurrently.
pub struct TransferFacade<S: ?Sized, P> {
    selector: StrategySelector<P>,
    put_object: PutObjectHandler<S>,
    multipart: MultipartHandler<S>,
    download: DownloadHandler<S>,
}

impl<S: ObjectStore + ?Sized, P: MemoryProbe> TransferFacade<S, P> {
    /// Create a facade over `store`, deciding with `probe` under `config`
    pub fn new(store: Arc<S>, probe: P, config: &TransferConfig) -> Self {
        Self {
            selector: StrategySelector::new(config.policy(), probe),
            put_object: PutObjectHandler::with_client(Arc::clone(&store)),
            multipart: MultipartHandler::with_client(Arc::clone(&store))
                .boundary(config.part_boundary)
                .concurrent_parts(config.concurrent_parts),
            download: DownloadHandler::with_client(store),
        }
    }

    /// Replace the multipart handler, e.g. to change the part size
    pub fn with_multipart_handler(mut self, handler: MultipartHandler<S>) -> Self {
        self.multipart = handler;
        self
    }

    /// The strategy selector in use
    pub fn selector(&self) -> &StrategySelector<P> {
        &self.selector
    }

    /// Upload a local file
    ///
    /// An empty source is reported as [`UploadOutcome::Skipped`] without any
    /// store call. Otherwise the selector picks a single request or a
    /// multipart upload.
    #[tracing::instrument(
        name = "facade.upload",
        skip(self, request),
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            source = %request.source.display(),
            upload.strategy = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome, TransferError> {
        let size = match tokio::fs::metadata(&request.source).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                let e = TransferError::from(e);
                metrics::record_upload_failure("none", e.kind());
                tracing::error!(error = %e, "Cannot read upload source");
                return Err(e);
            }
        };
        if size == 0 {
            tracing::info!("Source is empty, skipping upload");
            metrics::record_upload_skipped();
            return Ok(UploadOutcome::Skipped);
        }

        let strategy = self.selector.choose_upload(size);
        tracing::Span::current().record("upload.strategy", strategy.as_str());

        let start_time = Instant::now();
        let result = match strategy {
            UploadStrategy::SingleShot => self
                .put_object
                .upload(request, size)
                .await
                .map(|ack| UploadOutcome::SingleShot {
                    etag: ack.etag,
                    bytes: size,
                }),
            UploadStrategy::Chunked => self.multipart.upload(request, size).await.map(|outcome| {
                metrics::record_multipart_parts(outcome.parts.len());
                UploadOutcome::Multipart {
                    upload_id: outcome.upload_id,
                    parts: outcome.parts,
                    etag: outcome.etag,
                    bytes: size,
                }
            }),
        };
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => {
                metrics::record_upload_success(strategy.as_str(), size, duration.as_secs_f64());
                tracing::info!(
                    strategy = strategy.as_str(),
                    bytes = size,
                    duration_ms = duration.as_millis(),
                    "Upload completed"
                );
            }
            Err(e) => {
                if strategy == UploadStrategy::Chunked && aborted_session(e) {
                    metrics::record_multipart_abort();
                }
                metrics::record_upload_failure(strategy.as_str(), e.kind());
                tracing::error!(
                    strategy = strategy.as_str(),
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "Upload failed"
                );
            }
        }

        result
    }

    /// Upload the file at `path`
    pub async fn upload_path(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
        metadata: Option<ObjectMetadata>,
    ) -> Result<UploadOutcome, TransferError> {
        let request = UploadRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: path.as_ref().to_path_buf(),
            metadata,
        };
        self.upload(&request).await
    }

    /// Download an object, in memory or into `request.destination`
    pub async fn download(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadResponse, TransferError> {
        let result = self.download.download(request, &self.selector).await;

        match &result {
            Ok(response) => {
                let delivery = if response.payload.is_file_backed() {
                    Delivery::FileBacked
                } else {
                    Delivery::InMemory
                };
                metrics::record_download(delivery.as_str(), true);
            }
            Err(e) => {
                metrics::record_download("unknown", false);
                metrics::record_error(e.kind());
            }
        }

        result
    }
}

/// Whether a multipart failure left behind a session that was aborted.
///
/// `SessionAbortFailure` means the abort itself was rejected, so the
/// session may still be open.
fn aborted_session(error: &TransferError) -> bool {
    match error {
        TransferError::EmptyPlan { .. } | TransferError::LocalIo(_) => true,
        TransferError::RemoteTransferFailure { operation, .. } => {
            *operation != "initiate_multipart_upload"
        }
        TransferError::SessionAbortFailure { .. }
        | TransferError::EmptySource
        | TransferError::MissingDestination
        | TransferError::TooManyParts { .. } => false,
    }
}
