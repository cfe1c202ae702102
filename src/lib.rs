//! S3 Transfer Facade Library
//!
//! Memory-aware uploads and downloads over S3.
//!
//! # Features
//!
//! - **Strategy Selection**: Single request or multipart upload, in-memory or
//!   file-backed download, decided from free memory at call time
//! - **Multipart Safety**: A failed multipart upload is aborted exactly once
//! - **Pluggable Store**: Any [`store::ObjectStore`]; S3 via `aws-sdk-s3`
//!
//! # Example
//!
//! ```no_run
//! use s3_transfer_facade::{config::Config, facade::TransferFacade, memory::SystemMemoryProbe};
//! use s3_transfer_facade::s3::S3Client;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let client = S3Client::new((&config.s3).into()).await?;
//!     let facade = TransferFacade::new(Arc::new(client), SystemMemoryProbe::new(), &config.transfer);
//!     facade.upload_path("bucket", "key", "/data/file.bin", None).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod facade;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod s3;
pub mod store;
pub mod strategy;
pub mod transfer;

// Re-export commonly used types
pub use config::Config;
pub use facade::TransferFacade;
pub use store::{ObjectMetadata, ObjectStore};
pub use transfer::{DownloadRequest, TransferError, UploadOutcome, UploadRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
