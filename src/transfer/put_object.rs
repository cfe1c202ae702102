//! PutObject handler
//!
//! Handles uploads the strategy selector judged small enough for a single
//! request.

use super::{TransferError, UploadRequest};
use crate::store::{ObjectStore, PutAck};
use std::sync::Arc;

/// Single-request upload handler
pub struct PutObjectHandler<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ObjectStore + ?Sized> PutObjectHandler<S> {
    /// Create a handler using the given store
    pub fn with_client(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Upload `request.source` (`size` bytes) in one request
    ///
    /// The caller's metadata is copied, never mutated. `content_length` is
    /// filled in from `size` when unset or zero.
    #[tracing::instrument(
        name = "upload.put_object",
        skip(self, request),
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            upload.bytes = size
        ),
        err
    )]
    pub async fn upload(&self, request: &UploadRequest, size: u64) -> Result<PutAck, TransferError> {
        if size == 0 {
            return Err(TransferError::EmptySource);
        }

        let mut metadata = request.metadata.clone().unwrap_or_default();
        if metadata.content_length.unwrap_or(0) < 1 {
            metadata.content_length = Some(size);
        }

        let ack = self
            .store
            .put_object(&request.bucket, &request.key, &request.source, &metadata)
            .await
            .map_err(|e| TransferError::remote("put_object", e))?;

        tracing::info!(etag = ?ack.etag, bytes = size, "PutObject upload completed");
        Ok(ack)
    }
}
