//! Object store abstraction
//!
//! The transfer logic talks to storage only through the [`ObjectStore`]
//! trait. The S3 SDK client ([`crate::s3::S3Client`]) is the production
//! implementation; [`memory::InMemoryStore`] keeps objects in process for
//! tests and dry runs.
//!
//! # Operations
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | `put_object` | Single-request upload of a local file |
//! | `initiate_multipart_upload` | Open a multipart session |
//! | `upload_part` | Upload one byte range of a local file |
//! | `complete_multipart_upload` | Stitch ordered parts into the object |
//! | `abort_multipart_upload` | Release a session and its parts |
//! | `get_object_metadata` | Content length, type and user metadata |
//! | `get_object` | Whole object body in memory |
//! | `get_object_to_file` | Object body streamed to a local file |

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub use memory::InMemoryStore;

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Service error ({code}): {message}")]
    Service { code: String, message: String },

    #[error("Request error: {0}")]
    Request(String),

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object metadata
///
/// System fields plus ordered user-defined key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectMetadata {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub user_metadata: BTreeMap<String, String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectMetadata {
    /// Empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the content length
    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }

    /// Add a user-defined entry
    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }
}

/// One part upload request
///
/// The part's bytes are `length` bytes of `source` starting at `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartUpload {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
    pub source: PathBuf,
    pub metadata: ObjectMetadata,
}

/// Completed part info
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// PutObject acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutAck {
    pub etag: Option<String>,
}

/// CompleteMultipartUpload acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteAck {
    pub etag: Option<String>,
}

/// Storage operations the transfer logic depends on
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `source` as one object
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<PutAck, StoreError>;

    /// Open a multipart session, returning its upload id
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StoreError>;

    /// Upload one part of an open session
    async fn upload_part(&self, part: &PartUpload) -> Result<CompletedPart, StoreError>;

    /// Finish a session; `parts` must be in ascending part-number order
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteAck, StoreError>;

    /// Abandon a session and release its uploaded parts
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError>;

    /// Fetch object metadata without the body
    async fn get_object_metadata(&self, bucket: &str, key: &str)
        -> Result<ObjectMetadata, StoreError>;

    /// Fetch the whole object body
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    /// Stream the object body into `destination`, returning bytes written
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, StoreError>;
}

/// Read `length` bytes of `source` starting at `offset`
///
/// Fails with `UnexpectedEof` if the file is shorter than the range.
pub async fn read_range(source: &Path, offset: u64, length: u64) -> std::io::Result<Bytes> {
    let mut file = tokio::fs::File::open(source).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let len = usize::try_from(length)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "part too large"))?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer).await?;

    Ok(Bytes::from(buffer))
}
