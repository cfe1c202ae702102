//! Transfer Facade Integration Tests
//!
//! Drives the facade against a mocked object store (call counts and order)
//! and against the in-memory store (round trips).
//!
//! ## Test Coverage
//!
//! - Empty source makes no store calls
//! - Part failure aborts exactly once and never completes
//! - Completion receives parts in ascending order
//! - Upload then download under both selector outcomes

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use mockall::mock;
    use rand::Rng;
    use s3_transfer_facade::config::{MemoryPolicyMode, TransferConfig};
    use s3_transfer_facade::facade::TransferFacade;
    use s3_transfer_facade::memory::FixedMemoryProbe;
    use s3_transfer_facade::store::{
        CompleteAck, CompletedPart, InMemoryStore, ObjectMetadata, ObjectStore, PartUpload,
        PutAck, StoreError,
    };
    use s3_transfer_facade::transfer::multipart::MultipartHandler;
    use s3_transfer_facade::transfer::{
        DownloadPayload, DownloadRequest, TransferError, UploadOutcome, UploadRequest,
    };
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;

    const GIB: u64 = 1024 * 1024 * 1024;

    mock! {
        pub Store {}

        #[async_trait]
        impl ObjectStore for Store {
            async fn put_object(
                &self,
                bucket: &str,
                key: &str,
                source: &Path,
                metadata: &ObjectMetadata,
            ) -> Result<PutAck, StoreError>;

            async fn initiate_multipart_upload(
                &self,
                bucket: &str,
                key: &str,
                metadata: &ObjectMetadata,
            ) -> Result<String, StoreError>;

            async fn upload_part(&self, part: &PartUpload) -> Result<CompletedPart, StoreError>;

            async fn complete_multipart_upload(
                &self,
                bucket: &str,
                key: &str,
                upload_id: &str,
                parts: &[CompletedPart],
            ) -> Result<CompleteAck, StoreError>;

            async fn abort_multipart_upload(
                &self,
                bucket: &str,
                key: &str,
                upload_id: &str,
            ) -> Result<(), StoreError>;

            async fn get_object_metadata(
                &self,
                bucket: &str,
                key: &str,
            ) -> Result<ObjectMetadata, StoreError>;

            async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

            async fn get_object_to_file(
                &self,
                bucket: &str,
                key: &str,
                destination: &Path,
            ) -> Result<u64, StoreError>;
        }
    }

    fn random_file(len: usize) -> (tempfile::NamedTempFile, Vec<u8>) {
        let mut data = vec![0u8; len];
        rand::rng().fill(&mut data[..]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        (file, data)
    }

    /// Facade that always chunks, with tiny parts so tests stay small
    fn chunking_facade<S: ObjectStore + ?Sized>(
        store: Arc<S>,
        part_size: u64,
    ) -> TransferFacade<S, FixedMemoryProbe> {
        let handler = MultipartHandler::with_client(Arc::clone(&store)).part_size(part_size);
        TransferFacade::new(store, FixedMemoryProbe::new(0, GIB), &TransferConfig::default())
            .with_multipart_handler(handler)
    }

    // ========================================================================
    // TEST: Empty source
    // ========================================================================

    #[tokio::test]
    async fn test_empty_source_makes_no_store_calls() {
        let mut store = MockStore::new();
        store.expect_put_object().times(0);
        store.expect_initiate_multipart_upload().times(0);
        store.expect_upload_part().times(0);
        store.expect_complete_multipart_upload().times(0);
        store.expect_abort_multipart_upload().times(0);

        let (file, _) = random_file(0);
        let facade = TransferFacade::new(
            Arc::new(store),
            FixedMemoryProbe::new(GIB, GIB),
            &TransferConfig::default(),
        );

        let outcome = facade
            .upload(&UploadRequest::new("bucket", "empty.bin", file.path()))
            .await
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Skipped);
        assert!(!outcome.succeeded());
    }

    // ========================================================================
    // TEST: Single-shot metadata
    // ========================================================================

    #[tokio::test]
    async fn test_single_shot_fills_content_length() {
        let mut store = MockStore::new();
        store
            .expect_put_object()
            .withf(|bucket, key, _, metadata| {
                bucket == "bucket"
                    && key == "small.txt"
                    && metadata.content_length == Some(5)
                    && metadata.content_type.as_deref() == Some("text/plain")
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(PutAck {
                    etag: Some("\"put-etag\"".into()),
                })
            });
        store.expect_initiate_multipart_upload().times(0);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let facade = TransferFacade::new(
            Arc::new(store),
            FixedMemoryProbe::new(GIB, GIB),
            &TransferConfig::default(),
        );

        let metadata = ObjectMetadata::new().with_content_type("text/plain");
        let outcome = facade
            .upload_path("bucket", "small.txt", file.path(), Some(metadata))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::SingleShot {
                etag: Some("\"put-etag\"".into()),
                bytes: 5
            }
        );
    }

    // ========================================================================
    // TEST: Failure injection
    // ========================================================================

    #[tokio::test]
    async fn test_part_failure_aborts_exactly_once() {
        let mut store = MockStore::new();
        store.expect_put_object().times(0);
        store
            .expect_initiate_multipart_upload()
            .times(1)
            .returning(|_, _, _| Ok("upload-1".to_string()));
        store.expect_upload_part().times(2).returning(|part| {
            if part.part_number == 2 {
                Err(StoreError::Service {
                    code: "AccessDenied".into(),
                    message: "denied".into(),
                })
            } else {
                Ok(CompletedPart {
                    part_number: part.part_number,
                    etag: format!("etag-{}", part.part_number),
                })
            }
        });
        store.expect_complete_multipart_upload().times(0);
        store
            .expect_abort_multipart_upload()
            .withf(|bucket, key, upload_id| {
                bucket == "bucket" && key == "big.bin" && upload_id == "upload-1"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (file, _) = random_file(25);
        let facade = chunking_facade(Arc::new(store), 10);

        let err = facade
            .upload(&UploadRequest::new("bucket", "big.bin", file.path()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::RemoteTransferFailure {
                operation: "upload_part",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_abort_reports_both_errors() {
        let mut store = MockStore::new();
        store
            .expect_initiate_multipart_upload()
            .returning(|_, _, _| Ok("upload-2".to_string()));
        store.expect_upload_part().times(1).returning(|_| {
            Err(StoreError::Request("connection reset".into()))
        });
        store.expect_complete_multipart_upload().times(0);
        store
            .expect_abort_multipart_upload()
            .times(1)
            .returning(|_, _, upload_id| Err(StoreError::NoSuchUpload(upload_id.to_string())));

        let (file, _) = random_file(25);
        let facade = chunking_facade(Arc::new(store), 10);

        let err = facade
            .upload(&UploadRequest::new("bucket", "big.bin", file.path()))
            .await
            .unwrap_err();
        match err {
            TransferError::SessionAbortFailure {
                upload_id,
                original,
                abort,
            } => {
                assert_eq!(upload_id, "upload-2");
                assert!(original.to_string().contains("connection reset"));
                assert!(matches!(abort, StoreError::NoSuchUpload(_)));
            }
            other => panic!("Expected SessionAbortFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_completion_failure_aborts() {
        let mut store = MockStore::new();
        store
            .expect_initiate_multipart_upload()
            .returning(|_, _, _| Ok("upload-3".to_string()));
        store.expect_upload_part().returning(|part| {
            Ok(CompletedPart {
                part_number: part.part_number,
                etag: format!("etag-{}", part.part_number),
            })
        });
        store
            .expect_complete_multipart_upload()
            .times(1)
            .returning(|_, _, _, _| {
                Err(StoreError::Service {
                    code: "InvalidPart".into(),
                    message: "bad part".into(),
                })
            });
        store
            .expect_abort_multipart_upload()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (file, _) = random_file(25);
        let facade = chunking_facade(Arc::new(store), 10);

        let err = facade
            .upload(&UploadRequest::new("bucket", "big.bin", file.path()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::RemoteTransferFailure {
                operation: "complete_multipart_upload",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_initiate_failure_needs_no_abort() {
        let mut store = MockStore::new();
        store.expect_initiate_multipart_upload().times(1).returning(|_, _, _| {
            Err(StoreError::Service {
                code: "NoSuchBucket".into(),
                message: "missing".into(),
            })
        });
        store.expect_upload_part().times(0);
        store.expect_abort_multipart_upload().times(0);

        let (file, _) = random_file(25);
        let facade = chunking_facade(Arc::new(store), 10);

        let err = facade
            .upload(&UploadRequest::new("nope", "big.bin", file.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "remote_transfer_failure");
    }

    // ========================================================================
    // TEST: Part order and metadata
    // ========================================================================

    #[tokio::test]
    async fn test_completion_receives_ascending_parts() {
        let mut store = MockStore::new();
        store
            .expect_initiate_multipart_upload()
            .withf(|_, _, metadata| metadata.user_metadata.get("owner").map(String::as_str) == Some("qa"))
            .times(1)
            .returning(|_, _, _| Ok("upload-4".to_string()));
        store.expect_upload_part().times(3).returning(|part| {
            assert_eq!(part.metadata.user_metadata.get("owner").map(String::as_str), Some("qa"));
            Ok(CompletedPart {
                part_number: part.part_number,
                etag: format!("etag-{}", part.part_number),
            })
        });
        store
            .expect_complete_multipart_upload()
            .withf(|_, _, upload_id, parts| {
                upload_id == "upload-4"
                    && parts.iter().map(|p| p.part_number).collect::<Vec<_>>() == vec![1, 2, 3]
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(CompleteAck {
                    etag: Some("\"final\"".into()),
                })
            });
        store.expect_abort_multipart_upload().times(0);

        let (file, _) = random_file(25);
        let facade = chunking_facade(Arc::new(store), 10);

        let request = UploadRequest::new("bucket", "big.bin", file.path())
            .with_metadata(ObjectMetadata::new().with_user_metadata("owner", "qa"));
        let outcome = facade.upload(&request).await.unwrap();

        match outcome {
            UploadOutcome::Multipart {
                upload_id,
                parts,
                etag,
                bytes,
            } => {
                assert_eq!(upload_id, "upload-4");
                assert_eq!(parts.len(), 3);
                assert_eq!(etag.as_deref(), Some("\"final\""));
                assert_eq!(bytes, 25);
            }
            other => panic!("Expected multipart outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parallel_parts_keep_order() {
        let store = Arc::new(InMemoryStore::new());
        let config = TransferConfig {
            concurrent_parts: 4,
            ..TransferConfig::default()
        };
        let handler = MultipartHandler::with_client(Arc::clone(&store))
            .part_size(7)
            .concurrent_parts(config.concurrent_parts);
        let facade = TransferFacade::new(Arc::clone(&store), FixedMemoryProbe::new(0, GIB), &config)
            .with_multipart_handler(handler);

        let (file, data) = random_file(100);
        let outcome = facade
            .upload(&UploadRequest::new("bucket", "parallel.bin", file.path()))
            .await
            .unwrap();

        let UploadOutcome::Multipart { parts, .. } = outcome else {
            panic!("Expected multipart outcome");
        };
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, (1..=15).collect::<Vec<u32>>());
        assert_eq!(store.object("bucket", "parallel.bin").unwrap().to_vec(), data);
    }

    // ========================================================================
    // TEST: Round trips
    // ========================================================================

    #[tokio::test]
    async fn test_round_trip_in_memory() {
        let store = Arc::new(InMemoryStore::new());
        let facade = TransferFacade::new(
            Arc::clone(&store),
            FixedMemoryProbe::new(GIB, GIB),
            &TransferConfig::default(),
        );

        let (file, data) = random_file(4096);
        let outcome = facade
            .upload_path("bucket", "round.bin", file.path(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, UploadOutcome::SingleShot { bytes: 4096, .. }));

        let response = facade
            .download(&DownloadRequest::new("bucket", "round.bin"))
            .await
            .unwrap();
        assert_eq!(response.metadata.content_length, Some(4096));
        assert_eq!(response.payload.as_bytes().unwrap().to_vec(), data);
    }

    #[tokio::test]
    async fn test_round_trip_file_backed() {
        let store = Arc::new(InMemoryStore::new());
        let facade = chunking_facade(Arc::clone(&store), 1000);

        let (file, data) = random_file(4096);
        let outcome = facade
            .upload_path("bucket", "round.bin", file.path(), None)
            .await
            .unwrap();
        let UploadOutcome::Multipart { parts, .. } = outcome else {
            panic!("Expected multipart outcome");
        };
        assert_eq!(parts.len(), 5);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("round.bin");
        let response = facade
            .download(&DownloadRequest::new("bucket", "round.bin").with_destination(&dest))
            .await
            .unwrap();
        assert_eq!(response.payload, DownloadPayload::File(dest.clone()));
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn test_absolute_policy_round_trip() {
        let store = Arc::new(InMemoryStore::new());
        let config = TransferConfig {
            memory_policy: MemoryPolicyMode::Absolute,
            memory_absolute_bytes: 1024,
            ..TransferConfig::default()
        };
        // 2000 free: 512 bytes fit (1488 spare), 1500 bytes do not (500 spare)
        let facade = TransferFacade::new(Arc::clone(&store), FixedMemoryProbe::new(2000, GIB), &config);

        let (small, _) = random_file(512);
        let (large, large_data) = random_file(1500);

        let small_outcome = facade.upload_path("bucket", "small", small.path(), None).await.unwrap();
        assert!(matches!(small_outcome, UploadOutcome::SingleShot { .. }));

        let large_outcome = facade.upload_path("bucket", "large", large.path(), None).await.unwrap();
        assert!(matches!(large_outcome, UploadOutcome::Multipart { .. }));
        assert_eq!(store.object("bucket", "large").unwrap().to_vec(), large_data);
    }

    #[tokio::test]
    async fn test_download_without_destination_fails_when_large() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_object(
            "bucket",
            "big",
            Bytes::from(vec![7u8; 64]),
            ObjectMetadata::new(),
        );
        let facade = TransferFacade::new(
            store,
            FixedMemoryProbe::new(0, GIB),
            &TransferConfig::default(),
        );

        let err = facade
            .download(&DownloadRequest::new("bucket", "big"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::MissingDestination));
    }
}
