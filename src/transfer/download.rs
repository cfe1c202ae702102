//! Download handler
//!
//! Fetches object metadata first, then lets the strategy selector decide
//! between an in-memory body and a body streamed to the caller's file. The
//! object is fetched exactly once in either case.

use super::{DownloadPayload, DownloadRequest, DownloadResponse, TransferError};
use crate::memory::MemoryProbe;
use crate::store::ObjectStore;
use crate::strategy::{Delivery, StrategySelector};
use std::sync::Arc;

/// Download handler
pub struct DownloadHandler<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ObjectStore + ?Sized> DownloadHandler<S> {
    /// Create a handler using the given store
    pub fn with_client(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Download `request.key`, choosing the delivery mode with `selector`
    #[tracing::instrument(
        name = "download",
        skip(self, request, selector),
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            download.bytes = tracing::field::Empty,
            download.delivery = tracing::field::Empty
        ),
        err
    )]
    pub async fn download<P: MemoryProbe>(
        &self,
        request: &DownloadRequest,
        selector: &StrategySelector<P>,
    ) -> Result<DownloadResponse, TransferError> {
        let metadata = self
            .store
            .get_object_metadata(&request.bucket, &request.key)
            .await
            .map_err(|e| TransferError::remote("get_object_metadata", e))?;

        let size = metadata.content_length.unwrap_or(0);
        let delivery = selector.choose_delivery(size);

        let span = tracing::Span::current();
        span.record("download.bytes", size);
        span.record("download.delivery", delivery.as_str());

        let payload = match delivery {
            Delivery::InMemory => {
                let data = self
                    .store
                    .get_object(&request.bucket, &request.key)
                    .await
                    .map_err(|e| TransferError::remote("get_object", e))?;
                DownloadPayload::InMemory(data)
            }
            Delivery::FileBacked => {
                let destination = request
                    .destination
                    .as_ref()
                    .ok_or(TransferError::MissingDestination)?;
                let written = self
                    .store
                    .get_object_to_file(&request.bucket, &request.key, destination)
                    .await
                    .map_err(|e| TransferError::remote("get_object", e))?;
                if written != size {
                    tracing::warn!(
                        expected = size,
                        written = written,
                        "Downloaded size differs from metadata content length"
                    );
                }
                DownloadPayload::File(destination.clone())
            }
        };

        tracing::info!(delivery = delivery.as_str(), bytes = size, "Download completed");

        Ok(DownloadResponse { metadata, payload })
    }
}
