//! In-process Storage Gateway
//!
//! Keeps objects in a concurrent map. Used for local runs without an object
//! store and by the test suites. Links use a `memory://` scheme and are not
//! dereferenceable.

use super::{PresignedLink, StorageError, StorageGateway};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::time::Duration;

/// Characters escaped in the key segment of a memory link
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// An object held by [`MemoryGateway`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// Storage Gateway backed by a `DashMap`
#[derive(Debug)]
pub struct MemoryGateway {
    bucket: String,
    objects: DashMap<String, StoredObject>,
}

impl MemoryGateway {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: DashMap::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Snapshot of the object stored under `key`
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    #[tracing::instrument(
        name = "storage.put",
        skip(self, body),
        fields(s3.bucket = %self.bucket, s3.key = %key, upload.bytes = body.len()),
        err
    )]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    #[tracing::instrument(
        name = "storage.presign_get",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.key = %key, ttl_secs = ttl.as_secs()),
        err
    )]
    async fn presigned_get_url(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedLink, StorageError> {
        if !self.objects.contains_key(key) {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }

        let mut link = PresignedLink::new(String::new(), ttl);
        link.url = format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            utf8_percent_encode(key, KEY_ENCODE_SET),
            link.expires_at.timestamp()
        );
        Ok(link)
    }

    #[tracing::instrument(
        name = "storage.remove",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.key = %key),
        err
    )]
    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        // Missing keys succeed, matching S3 DeleteObject
        self.objects.remove(key);
        Ok(())
    }

    #[tracing::instrument(name = "storage.ensure_bucket", skip(self), fields(s3.bucket = %self.bucket), err)]
    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        tracing::debug!("Memory bucket is always present");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_presign() {
        let gateway = MemoryGateway::new("files");
        gateway
            .put("a.txt", Bytes::from("hello"), "text/plain; charset=utf-8")
            .await
            .unwrap();

        let stored = gateway.get("a.txt").unwrap();
        assert_eq!(stored.body, Bytes::from("hello"));
        assert_eq!(stored.content_type, "text/plain; charset=utf-8");

        let link = gateway
            .presigned_get_url("a.txt", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(link.url.starts_with("memory://files/a.txt?expires="));
        assert_eq!(link.expires_in, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_presign_missing_key_is_not_found() {
        let gateway = MemoryGateway::new("files");
        let err = gateway
            .presigned_get_url("nope", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_link_escapes_key() {
        let gateway = MemoryGateway::new("files");
        gateway
            .put("my report?.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();

        let link = gateway
            .presigned_get_url("my report?.pdf", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(link.url.starts_with("memory://files/my%20report%3F.pdf?expires="));
    }

    #[tokio::test]
    async fn test_remove_missing_key_succeeds() {
        let gateway = MemoryGateway::new("files");
        gateway.put("a", Bytes::from("x"), "text/plain").await.unwrap();

        gateway.remove("a").await.unwrap();
        gateway.remove("a").await.unwrap();
        assert!(gateway.is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let gateway = MemoryGateway::new("files");
        gateway.put("k", Bytes::from("one"), "text/plain").await.unwrap();
        gateway.put("k", Bytes::from("two"), "text/plain").await.unwrap();

        assert_eq!(gateway.len(), 1);
        assert_eq!(gateway.get("k").unwrap().body, Bytes::from("two"));
    }
}
