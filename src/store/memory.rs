//! In-process object store
//!
//! Keeps objects and multipart sessions in memory. Behaves like S3 where the
//! transfer logic can observe it: part ETags, ordered completion, aborts
//! dropping uploaded parts. Part failures can be injected to exercise the
//! abort path.

use super::{
    read_range, CompleteAck, CompletedPart, ObjectMetadata, ObjectStore, PartUpload, PutAck,
    StoreError,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    metadata: ObjectMetadata,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    failing_parts: HashSet<u32>,
    aborted: Vec<String>,
    completed: Vec<String>,
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload of `part_number` fail with a service error
    pub fn fail_part(&self, part_number: u32) {
        self.state.lock().failing_parts.insert(part_number);
    }

    /// Number of multipart sessions still open
    pub fn open_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    /// Upload ids of aborted sessions, in abort order
    pub fn aborted_uploads(&self) -> Vec<String> {
        self.state.lock().aborted.clone()
    }

    /// Upload ids of completed sessions, in completion order
    pub fn completed_uploads(&self) -> Vec<String> {
        self.state.lock().completed.clone()
    }

    /// Stored object body, if present
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.data.clone())
    }

    /// Store an object directly, bypassing the upload paths
    pub fn insert_object(&self, bucket: &str, key: &str, data: Bytes, metadata: ObjectMetadata) {
        let metadata = stored_metadata(metadata, &data, None);
        self.state.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject { data, metadata },
        );
    }

    fn lookup(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

fn etag_of(data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    format!("\"{}\"", &digest[..32])
}

fn stored_metadata(mut metadata: ObjectMetadata, data: &Bytes, etag: Option<String>) -> ObjectMetadata {
    metadata.content_length = Some(data.len() as u64);
    metadata.etag = Some(etag.unwrap_or_else(|| etag_of(data)));
    metadata.last_modified = Some(Utc::now());
    metadata
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<PutAck, StoreError> {
        let data = Bytes::from(tokio::fs::read(source).await?);
        let metadata = stored_metadata(metadata.clone(), &data, None);
        let etag = metadata.etag.clone();

        self.state.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject { data, metadata },
        );

        Ok(PutAck { etag })
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StoreError> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.state.lock().uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(&self, part: &PartUpload) -> Result<CompletedPart, StoreError> {
        if self.state.lock().failing_parts.contains(&part.part_number) {
            return Err(StoreError::Service {
                code: "InternalError".into(),
                message: format!("injected failure for part {}", part.part_number),
            });
        }

        let data = read_range(&part.source, part.offset, part.length).await?;
        let etag = etag_of(&data);

        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get_mut(&part.upload_id)
            .ok_or_else(|| StoreError::NoSuchUpload(part.upload_id.clone()))?;
        upload.parts.insert(part.part_number, (etag.clone(), data));

        Ok(CompletedPart {
            part_number: part.part_number,
            etag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteAck, StoreError> {
        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;

        if upload.bucket != bucket || upload.key != key {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        if parts.is_empty() {
            return Err(StoreError::Service {
                code: "MalformedXML".into(),
                message: "no parts specified".into(),
            });
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StoreError::Service {
                code: "InvalidPartOrder".into(),
                message: "parts must be in ascending order".into(),
            });
        }

        let mut body = BytesMut::new();
        let mut digests = Vec::with_capacity(parts.len());
        for part in parts {
            let (etag, data) = upload.parts.get(&part.part_number).ok_or_else(|| {
                StoreError::Service {
                    code: "InvalidPart".into(),
                    message: format!("part {} was not uploaded", part.part_number),
                }
            })?;
            if *etag != part.etag {
                return Err(StoreError::Service {
                    code: "InvalidPart".into(),
                    message: format!("etag mismatch for part {}", part.part_number),
                });
            }
            body.extend_from_slice(data);
            digests.extend_from_slice(etag.as_bytes());
        }

        let digest = hex::encode(Sha256::digest(&digests));
        let etag = format!("\"{}-{}\"", &digest[..32], parts.len());

        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
        let data = body.freeze();
        let metadata = stored_metadata(upload.metadata, &data, Some(etag.clone()));
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject { data, metadata },
        );
        state.completed.push(upload_id.to_string());

        Ok(CompleteAck { etag: Some(etag) })
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
        state.aborted.push(upload_id.to_string());
        Ok(())
    }

    async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectMetadata, StoreError> {
        Ok(self.lookup(bucket, key)?.metadata)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        Ok(self.lookup(bucket, key)?.data)
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, StoreError> {
        let object = self.lookup(bucket, key)?;
        tokio::fs::write(destination, &object.data).await?;
        Ok(object.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file
    }

    fn part(upload_id: &str, source: &Path, number: u32, offset: u64, length: u64) -> PartUpload {
        PartUpload {
            bucket: "bucket".into(),
            key: "key".into(),
            upload_id: upload_id.into(),
            part_number: number,
            offset,
            length,
            source: source.to_path_buf(),
            metadata: ObjectMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        let file = temp_file(b"hello");
        let metadata = ObjectMetadata::new().with_user_metadata("owner", "me");

        let ack = store
            .put_object("bucket", "key", file.path(), &metadata)
            .await
            .unwrap();
        assert!(ack.etag.is_some());

        let head = store.get_object_metadata("bucket", "key").await.unwrap();
        assert_eq!(head.content_length, Some(5));
        assert_eq!(head.user_metadata.get("owner").map(String::as_str), Some("me"));
        assert_eq!(&store.get_object("bucket", "key").await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = InMemoryStore::new();
        let err = store.get_object("bucket", "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_multipart_complete() {
        let store = InMemoryStore::new();
        let file = temp_file(b"abcdef");
        let upload_id = store
            .initiate_multipart_upload("bucket", "key", &ObjectMetadata::default())
            .await
            .unwrap();

        let p1 = store.upload_part(&part(&upload_id, file.path(), 1, 0, 4)).await.unwrap();
        let p2 = store.upload_part(&part(&upload_id, file.path(), 2, 4, 2)).await.unwrap();

        let ack = store
            .complete_multipart_upload("bucket", "key", &upload_id, &[p1, p2])
            .await
            .unwrap();
        assert!(ack.etag.unwrap().ends_with("-2\""));
        assert_eq!(&store.object("bucket", "key").unwrap()[..], b"abcdef");
        assert_eq!(store.open_uploads(), 0);
        assert_eq!(store.completed_uploads(), vec![upload_id]);
    }

    #[tokio::test]
    async fn test_multipart_rejects_descending_parts() {
        let store = InMemoryStore::new();
        let file = temp_file(b"abcdef");
        let upload_id = store
            .initiate_multipart_upload("bucket", "key", &ObjectMetadata::default())
            .await
            .unwrap();

        let p1 = store.upload_part(&part(&upload_id, file.path(), 1, 0, 3)).await.unwrap();
        let p2 = store.upload_part(&part(&upload_id, file.path(), 2, 3, 3)).await.unwrap();

        let err = store
            .complete_multipart_upload("bucket", "key", &upload_id, &[p2, p1])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Service { ref code, .. } if code == "InvalidPartOrder"));
    }

    #[tokio::test]
    async fn test_injected_part_failure_and_abort() {
        let store = InMemoryStore::new();
        store.fail_part(2);
        let file = temp_file(b"abcdef");
        let upload_id = store
            .initiate_multipart_upload("bucket", "key", &ObjectMetadata::default())
            .await
            .unwrap();

        store.upload_part(&part(&upload_id, file.path(), 1, 0, 3)).await.unwrap();
        assert!(store.upload_part(&part(&upload_id, file.path(), 2, 3, 3)).await.is_err());

        store.abort_multipart_upload("bucket", "key", &upload_id).await.unwrap();
        assert_eq!(store.open_uploads(), 0);
        assert_eq!(store.aborted_uploads(), vec![upload_id.clone()]);

        let err = store
            .abort_multipart_upload("bucket", "key", &upload_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchUpload(_)));
    }

    #[tokio::test]
    async fn test_get_object_to_file() {
        let store = InMemoryStore::new();
        store.insert_object("bucket", "key", Bytes::from_static(b"payload"), ObjectMetadata::default());
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");

        let written = store.get_object_to_file("bucket", "key", &dest).await.unwrap();
        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }
}
