//! Multipart upload handler
//!
//! Uploads large files as fixed-size parts.
//!
//! # Flow
//!
//! 1. Open a session (`initiate_multipart_upload`)
//! 2. Upload each planned part, carrying the caller's metadata
//! 3. Complete the session with the part ETags in ascending part order
//!
//! Any failure after the session is open aborts it exactly once before the
//! error is returned; a partial completion is never attempted. Parts run
//! one at a time by default. With `concurrent_parts > 1` up to that many
//! run at once, results are still assembled in part order, and the first
//! failure drops the in-flight parts before the abort.

use super::plan::{checked_plan, PartBoundary, PartDescriptor, PART_SIZE};
use super::{MultipartSession, TransferError, UploadRequest};
use crate::store::{CompletedPart, ObjectMetadata, ObjectStore, PartUpload};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;

/// Result of a completed multipart upload
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartOutcome {
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
    pub etag: Option<String>,
}

/// Multipart upload handler
pub struct MultipartHandler<S: ?Sized> {
    store: Arc<S>,
    part_size: u64,
    boundary: PartBoundary,
    concurrent_parts: usize,
}

impl<S: ObjectStore + ?Sized> MultipartHandler<S> {
    /// Create a handler with the fixed 10 MiB part size, tiled boundary and
    /// sequential part uploads
    pub fn with_client(store: Arc<S>) -> Self {
        Self {
            store,
            part_size: PART_SIZE,
            boundary: PartBoundary::Tiled,
            concurrent_parts: 1,
        }
    }

    /// Set the part boundary behavior
    pub fn boundary(mut self, boundary: PartBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Set how many parts may upload at once (minimum 1)
    pub fn concurrent_parts(mut self, concurrent_parts: usize) -> Self {
        self.concurrent_parts = concurrent_parts.max(1);
        self
    }

    /// Override the part size
    ///
    /// Production uploads use [`PART_SIZE`]; smaller sizes keep tests fast.
    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Upload `request.source` (`size` bytes) as a multipart upload
    #[tracing::instrument(
        name = "upload.multipart",
        skip(self, request),
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            upload.bytes = size,
            s3.upload_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        request: &UploadRequest,
        size: u64,
    ) -> Result<MultipartOutcome, TransferError> {
        if size == 0 {
            return Err(TransferError::EmptySource);
        }

        let plan = checked_plan(size, self.part_size, self.boundary)?;

        let metadata = request.metadata.clone().unwrap_or_default();
        let session = self.create(request, &metadata).await?;
        tracing::Span::current().record("s3.upload_id", session.upload_id.as_str());

        if plan.is_empty() {
            return Err(self.abort(&session, TransferError::EmptyPlan { size }).await);
        }

        let parts = match self.upload_parts(&session, request, &metadata, &plan).await {
            Ok(parts) => parts,
            Err(e) => return Err(self.abort(&session, e).await),
        };
        debug_assert!(parts.windows(2).all(|w| w[0].part_number < w[1].part_number));

        let ack = match self
            .store
            .complete_multipart_upload(&session.bucket, &session.key, &session.upload_id, &parts)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                let error = TransferError::remote("complete_multipart_upload", e);
                return Err(self.abort(&session, error).await);
            }
        };

        tracing::info!(
            upload_id = %session.upload_id,
            parts = parts.len(),
            etag = ?ack.etag,
            "Completed multipart upload"
        );

        Ok(MultipartOutcome {
            upload_id: session.upload_id,
            parts,
            etag: ack.etag,
        })
    }

    async fn create(
        &self,
        request: &UploadRequest,
        metadata: &ObjectMetadata,
    ) -> Result<MultipartSession, TransferError> {
        let upload_id = self
            .store
            .initiate_multipart_upload(&request.bucket, &request.key, metadata)
            .await
            .map_err(|e| TransferError::remote("initiate_multipart_upload", e))?;

        tracing::info!(upload_id = %upload_id, "Created multipart upload");

        Ok(MultipartSession {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            upload_id,
        })
    }

    async fn upload_parts(
        &self,
        session: &MultipartSession,
        request: &UploadRequest,
        metadata: &ObjectMetadata,
        plan: &[PartDescriptor],
    ) -> Result<Vec<CompletedPart>, TransferError> {
        let store = &self.store;

        futures::stream::iter(plan.iter().map(|descriptor| {
            let part = PartUpload {
                bucket: session.bucket.clone(),
                key: session.key.clone(),
                upload_id: session.upload_id.clone(),
                part_number: descriptor.part_number,
                offset: descriptor.offset,
                length: descriptor.length,
                source: request.source.clone(),
                metadata: metadata.clone(),
            };
            async move {
                let completed = store
                    .upload_part(&part)
                    .await
                    .map_err(|e| TransferError::remote("upload_part", e))?;
                tracing::debug!(
                    part_number = part.part_number,
                    offset = part.offset,
                    size = part.length,
                    "Uploaded part"
                );
                Ok::<_, TransferError>(completed)
            }
        }))
        .buffered(self.concurrent_parts)
        .try_collect()
        .await
    }

    /// Abort `session` after `original`, returning the error to surface
    ///
    /// The original error wins; a failed abort wraps it so the leaked
    /// session is visible to the caller.
    async fn abort(&self, session: &MultipartSession, original: TransferError) -> TransferError {
        match self
            .store
            .abort_multipart_upload(&session.bucket, &session.key, &session.upload_id)
            .await
        {
            Ok(()) => {
                tracing::warn!(
                    upload_id = %session.upload_id,
                    error = %original,
                    "Aborted multipart upload"
                );
                original
            }
            Err(abort) => {
                tracing::error!(
                    upload_id = %session.upload_id,
                    error = %original,
                    abort_error = %abort,
                    "Failed to abort multipart upload, session may be leaked"
                );
                TransferError::SessionAbortFailure {
                    upload_id: session.upload_id.clone(),
                    original: Box::new(original),
                    abort,
                }
            }
        }
    }
}
