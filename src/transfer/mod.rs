//! Transfer module
//!
//! Upload and download executors plus their shared request, result and
//! error types.
//!
//! - [`put_object`]: single-request upload
//! - [`multipart`]: chunked upload with session abort on failure
//! - [`download`]: in-memory or file-backed retrieval
//! - [`plan`]: part planning

use crate::store::{CompletedPart, ObjectMetadata, StoreError};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod download;
pub mod multipart;
pub mod plan;
pub mod put_object;

/// Transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Source is empty, nothing to transfer")]
    EmptySource,

    #[error("Remote {operation} failed: {source}")]
    RemoteTransferFailure {
        operation: &'static str,
        source: StoreError,
    },

    #[error("Abort of multipart upload {upload_id} failed ({abort}) after: {original}")]
    SessionAbortFailure {
        upload_id: String,
        #[source]
        original: Box<TransferError>,
        abort: StoreError,
    },

    #[error("Local IO error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("File-backed download requires a destination file")]
    MissingDestination,

    #[error("Part plan for {size} bytes is empty")]
    EmptyPlan { size: u64 },

    #[error("Too many parts: {parts} (maximum {max})")]
    TooManyParts { parts: u64, max: u64 },
}

impl TransferError {
    /// Wrap a store error from `operation`
    ///
    /// Local I/O failures reported by the store (reading the source file,
    /// writing the destination) become [`TransferError::LocalIo`].
    pub fn remote(operation: &'static str, error: StoreError) -> Self {
        match error {
            StoreError::Io(io) => TransferError::LocalIo(io),
            source => TransferError::RemoteTransferFailure { operation, source },
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::EmptySource => "empty_source",
            TransferError::RemoteTransferFailure { .. } => "remote_transfer_failure",
            TransferError::SessionAbortFailure { .. } => "session_abort_failure",
            TransferError::LocalIo(_) => "local_io_failure",
            TransferError::MissingDestination => "missing_destination",
            TransferError::EmptyPlan { .. } => "empty_plan",
            TransferError::TooManyParts { .. } => "too_many_parts",
        }
    }
}

/// Upload request
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub bucket: String,
    pub key: String,
    pub source: PathBuf,
    pub metadata: Option<ObjectMetadata>,
}

impl UploadRequest {
    /// Create a request without metadata
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            source: source.into(),
            metadata: None,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: ObjectMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Download request
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub bucket: String,
    pub key: String,
    /// Used only when the object is too large to hold in memory
    pub destination: Option<PathBuf>,
}

impl DownloadRequest {
    /// Create a request without a destination file
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            destination: None,
        }
    }

    /// Set the destination file for file-backed delivery
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Multipart session
///
/// Lives for one chunked transfer and ends completed or aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartSession {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// Upload outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Empty source; nothing was sent to the store
    Skipped,
    /// Uploaded with one PutObject request
    SingleShot { etag: Option<String>, bytes: u64 },
    /// Uploaded as a completed multipart upload
    Multipart {
        upload_id: String,
        parts: Vec<CompletedPart>,
        etag: Option<String>,
        bytes: u64,
    },
}

impl UploadOutcome {
    /// Whether the object was stored
    pub fn succeeded(&self) -> bool {
        !matches!(self, UploadOutcome::Skipped)
    }
}

/// Download payload
///
/// Exactly one representation is authoritative; match before access.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadPayload {
    /// Whole object body in memory
    InMemory(Bytes),
    /// Object body written to this file
    File(PathBuf),
}

impl DownloadPayload {
    /// In-memory body, if this payload is in memory
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            DownloadPayload::InMemory(bytes) => Some(bytes),
            DownloadPayload::File(_) => None,
        }
    }

    /// Destination file, if this payload is file-backed
    pub fn as_file(&self) -> Option<&PathBuf> {
        match self {
            DownloadPayload::InMemory(_) => None,
            DownloadPayload::File(path) => Some(path),
        }
    }

    /// Whether the payload was stored to a file
    pub fn is_file_backed(&self) -> bool {
        matches!(self, DownloadPayload::File(_))
    }

    /// Make sure the body ends up in `destination`, returning its size
    ///
    /// An in-memory body is written out; a file-backed body is copied unless
    /// it already lives at `destination`.
    pub async fn save_to(&self, destination: &Path) -> std::io::Result<u64> {
        match self {
            DownloadPayload::InMemory(data) => {
                tokio::fs::write(destination, data).await?;
                Ok(data.len() as u64)
            }
            DownloadPayload::File(path) if path == destination => {
                Ok(tokio::fs::metadata(path).await?.len())
            }
            DownloadPayload::File(path) => tokio::fs::copy(path, destination).await,
        }
    }
}

/// Download response
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResponse {
    pub metadata: ObjectMetadata,
    pub payload: DownloadPayload,
}
