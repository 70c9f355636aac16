//! Object operations
//!
//! Single-item operations call the Storage Gateway sequentially. The bulk
//! operations run the same per-item units through the [`BatchCoordinator`]
//! and resolve all-or-nothing.
//!
//! | Operation | Key | Link validity |
//! |-----------|-----|---------------|
//! | `create_one` | fresh UUID v4 | configured `link_expiration_hours` |
//! | `create_many` | filename | configured `link_expiration_hours` |
//! | `get_one` / `get_many` | caller id | fixed [`FETCH_LINK_TTL`] (24h) |
//! | `delete_one` / `delete_many` | caller id | - |

pub mod sniff;

use crate::batch::{BatchCoordinator, BatchError, BatchRequest};
use crate::config::Config;
use crate::metrics;
use crate::storage::{PresignedLink, StorageError, StorageGateway};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use sniff::detect_content_type;

/// Validity of links handed out by fetch operations, independent of configuration
pub const FETCH_LINK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Single-item operation errors
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The unit was abandoned after a sibling item failed
    #[error("Operation cancelled")]
    Cancelled,
}

impl ObjectError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_not_found())
    }
}

/// Failure of a bulk operation
pub type BulkError = BatchError<ObjectError>;

/// A named upload from a multipart form
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub filename: String,
    pub data: Bytes,
}

/// Result of a create operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedObject {
    pub object_id: String,
    pub link: PresignedLink,
}

/// Result of a bulk fetch-link operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLink {
    pub object_id: String,
    pub link: PresignedLink,
}

/// Object operations over one Storage Gateway
#[derive(Clone)]
pub struct ObjectService {
    gateway: Arc<dyn StorageGateway>,
    link_expiration: Duration,
    coordinator: BatchCoordinator,
}

impl ObjectService {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        link_expiration: Duration,
        coordinator: BatchCoordinator,
    ) -> Self {
        Self {
            gateway,
            link_expiration,
            coordinator,
        }
    }

    pub fn from_config(gateway: Arc<dyn StorageGateway>, config: &Config) -> Self {
        Self::new(
            gateway,
            config.storage.link_expiration(),
            BatchCoordinator::from_config(&config.batch),
        )
    }

    /// Validity of links returned by create operations
    pub fn link_expiration(&self) -> Duration {
        self.link_expiration
    }

    /// Store `data` under a fresh identifier and sign a link for it
    pub async fn create_one(&self, data: Bytes) -> Result<CreatedObject, ObjectError> {
        let object_id = Uuid::new_v4().to_string();
        create_object(self.gateway.as_ref(), &object_id, data, self.link_expiration, None).await
    }

    /// Sign a fetch link for an existing object
    pub async fn get_one(&self, object_id: &str) -> Result<PresignedLink, ObjectError> {
        validate_object_id(object_id)?;
        fetch_link(self.gateway.as_ref(), object_id).await
    }

    pub async fn delete_one(&self, object_id: &str) -> Result<(), ObjectError> {
        validate_object_id(object_id)?;
        delete_object(self.gateway.as_ref(), object_id).await
    }

    /// Store every file under its filename
    ///
    /// Files sharing a filename collapse to the last one.
    pub async fn create_many(&self, files: Vec<FilePayload>) -> Result<Vec<CreatedObject>, BulkError> {
        let request: BatchRequest<Bytes> = files
            .into_iter()
            .map(|file| (file.filename, file.data))
            .collect();
        validate_request(&request)?;

        let gateway = Arc::clone(&self.gateway);
        let ttl = self.link_expiration;
        let results = self
            .coordinator
            .run("create", request, move |item, cancel| {
                let gateway = Arc::clone(&gateway);
                async move {
                    create_object(gateway.as_ref(), &item.key, item.input, ttl, Some(&cancel)).await
                }
            })
            .await?;

        Ok(results.into_iter().map(|result| result.value).collect())
    }

    /// Sign a fetch link for every id
    pub async fn get_many(&self, object_ids: Vec<String>) -> Result<Vec<ObjectLink>, BulkError> {
        let request = id_request(object_ids);
        validate_request(&request)?;

        let gateway = Arc::clone(&self.gateway);
        let results = self
            .coordinator
            .run("get", request, move |item, _cancel| {
                let gateway = Arc::clone(&gateway);
                async move { fetch_link(gateway.as_ref(), &item.key).await }
            })
            .await?;

        Ok(results
            .into_iter()
            .map(|result| ObjectLink {
                object_id: result.key,
                link: result.value,
            })
            .collect())
    }

    /// Remove every id, returning the acknowledged ids
    pub async fn delete_many(&self, object_ids: Vec<String>) -> Result<Vec<String>, BulkError> {
        let request = id_request(object_ids);
        validate_request(&request)?;

        let gateway = Arc::clone(&self.gateway);
        let results = self
            .coordinator
            .run("delete", request, move |item, _cancel| {
                let gateway = Arc::clone(&gateway);
                async move { delete_object(gateway.as_ref(), &item.key).await }
            })
            .await?;

        Ok(results.into_iter().map(|result| result.key).collect())
    }
}

fn id_request(object_ids: Vec<String>) -> BatchRequest<()> {
    object_ids.into_iter().map(|id| (id, ())).collect()
}

fn validate_object_id(object_id: &str) -> Result<(), ObjectError> {
    if object_id.is_empty() {
        return Err(ObjectError::InvalidInput("object id must not be empty".into()));
    }
    if object_id.chars().any(char::is_control) {
        return Err(ObjectError::InvalidInput(format!(
            "object id {:?} contains control characters",
            object_id
        )));
    }
    Ok(())
}

/// Reject bad keys before anything is dispatched
fn validate_request<T>(request: &BatchRequest<T>) -> Result<(), BulkError> {
    for key in request.keys() {
        validate_object_id(key).map_err(|source| BatchError::Item {
            key: key.to_string(),
            source,
        })?;
    }
    Ok(())
}

async fn create_object(
    gateway: &dyn StorageGateway,
    key: &str,
    data: Bytes,
    ttl: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<CreatedObject, ObjectError> {
    validate_object_id(key)?;
    let start = Instant::now();
    let result = store_and_sign(gateway, key, data, ttl, cancel).await;
    record("create", &result, start);
    result
}

/// Put then sign; an orphaned object is left behind if signing fails
async fn store_and_sign(
    gateway: &dyn StorageGateway,
    key: &str,
    data: Bytes,
    ttl: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<CreatedObject, ObjectError> {
    let size = data.len() as u64;
    let content_type = detect_content_type(&data);

    gateway.put(key, data, content_type).await?;
    metrics::record_object_bytes(size);

    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(ObjectError::Cancelled);
    }

    let link = gateway.presigned_get_url(key, ttl).await?;
    Ok(CreatedObject {
        object_id: key.to_string(),
        link,
    })
}

async fn fetch_link(gateway: &dyn StorageGateway, key: &str) -> Result<PresignedLink, ObjectError> {
    let start = Instant::now();
    let result = gateway
        .presigned_get_url(key, FETCH_LINK_TTL)
        .await
        .map_err(ObjectError::from);
    record("get", &result, start);
    result
}

async fn delete_object(gateway: &dyn StorageGateway, key: &str) -> Result<(), ObjectError> {
    let start = Instant::now();
    let result = gateway.remove(key).await.map_err(ObjectError::from);
    record("delete", &result, start);
    result
}

fn record<T>(operation: &str, result: &Result<T, ObjectError>, start: Instant) {
    metrics::record_object_operation(operation, result.is_ok(), start.elapsed().as_secs_f64());
    match result {
        Err(ObjectError::Cancelled) | Ok(_) => {}
        Err(e) if e.is_not_found() => metrics::record_error("not_found"),
        Err(_) => metrics::record_error("storage"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryGateway;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl StorageGateway for Gateway {
            async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;
            async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<PresignedLink, StorageError>;
            async fn remove(&self, key: &str) -> Result<(), StorageError>;
            async fn ensure_bucket(&self) -> Result<(), StorageError>;
        }
    }

    fn service(gateway: Arc<dyn StorageGateway>, expiration: Duration) -> ObjectService {
        ObjectService::new(gateway, expiration, BatchCoordinator::new(4))
    }

    fn memory_service(expiration: Duration) -> (Arc<MemoryGateway>, ObjectService) {
        let gateway = Arc::new(MemoryGateway::new("files"));
        let service = service(gateway.clone(), expiration);
        (gateway, service)
    }

    fn file(name: &str, data: &'static str) -> FilePayload {
        FilePayload {
            filename: name.to_string(),
            data: Bytes::from_static(data.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_create_one_uses_configured_expiration() {
        let (gateway, service) = memory_service(Duration::from_secs(2 * 3600));

        let created = service.create_one(Bytes::from("hello")).await.unwrap();

        assert!(Uuid::parse_str(&created.object_id).is_ok());
        assert_eq!(created.link.expires_in, Duration::from_secs(2 * 3600));
        assert_ne!(created.link.expires_in, FETCH_LINK_TTL);

        let stored = gateway.get(&created.object_id).unwrap();
        assert_eq!(stored.body.len(), 5);
        assert_eq!(stored.content_type, "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_get_one_uses_fixed_ttl() {
        let (_gateway, service) = memory_service(Duration::from_secs(3600));
        let created = service.create_one(Bytes::from("hello")).await.unwrap();

        let link = service.get_one(&created.object_id).await.unwrap();
        assert_eq!(link.expires_in, FETCH_LINK_TTL);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let (_gateway, service) = memory_service(Duration::from_secs(3600));
        let created = service.create_one(Bytes::from("hello")).await.unwrap();

        service.delete_one(&created.object_id).await.unwrap();
        let err = service.get_one(&created.object_id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let (_gateway, service) = memory_service(Duration::from_secs(3600));
        assert!(matches!(
            service.get_one("").await,
            Err(ObjectError::InvalidInput(_))
        ));
        assert!(matches!(
            service.delete_one("").await,
            Err(ObjectError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_create_many_keys_by_filename() {
        let (gateway, service) = memory_service(Duration::from_secs(3600));

        let created = service
            .create_many(vec![file("a.txt", "alpha"), file("b.txt", "beta")])
            .await
            .unwrap();

        let ids: Vec<_> = created.iter().map(|c| c.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "b.txt"]);
        assert!(gateway.contains("a.txt"));
        assert!(gateway.contains("b.txt"));
        assert!(created
            .iter()
            .all(|c| c.link.expires_in == Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_create_many_duplicate_filename_last_wins() {
        let (gateway, service) = memory_service(Duration::from_secs(3600));

        let created = service
            .create_many(vec![file("same", "first"), file("same", "second")])
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(gateway.get("same").unwrap().body, Bytes::from("second"));
    }

    #[tokio::test]
    async fn test_create_many_one_failure_fails_batch() {
        let mut mock = MockGateway::new();
        mock.expect_put().returning(|key: &str, _body, _content_type| {
            if key == "C" {
                Err(StorageError::backend("PutObject", key, "simulated outage"))
            } else {
                Ok(())
            }
        });
        mock.expect_presigned_get_url()
            .returning(|key: &str, ttl| Ok(PresignedLink::new(format!("http://store/{key}"), ttl)));

        let service = service(Arc::new(mock), Duration::from_secs(3600));
        let err = service
            .create_many(vec![file("A", "a"), file("B", "b"), file("C", "c")])
            .await
            .unwrap_err();

        assert_eq!(err.key(), Some("C"));
        assert!(err.to_string().contains("simulated outage"));
    }

    #[tokio::test]
    async fn test_empty_id_in_bulk_rejected_before_dispatch() {
        let mut mock = MockGateway::new();
        mock.expect_remove().times(0);

        let service = service(Arc::new(mock), Duration::from_secs(3600));
        let err = service
            .delete_many(vec!["x".into(), String::new()])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BatchError::Item {
                source: ObjectError::InvalidInput(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bulk_delete_acknowledges_every_id() {
        let mut mock = MockGateway::new();
        mock.expect_remove().times(2).returning(|_key: &str| Ok(()));

        let service = service(Arc::new(mock), Duration::from_secs(3600));
        let deleted = service
            .delete_many(vec!["X".into(), "Y".into()])
            .await
            .unwrap();

        assert_eq!(deleted, vec!["X".to_string(), "Y".to_string()]);
    }

    #[tokio::test]
    async fn test_bulk_get_missing_id_fails() {
        let (_gateway, service) = memory_service(Duration::from_secs(3600));
        service
            .create_many(vec![file("present", "data")])
            .await
            .unwrap();

        let err = service
            .get_many(vec!["present".into(), "missing".into()])
            .await
            .unwrap_err();

        assert_eq!(err.key(), Some("missing"));
        match err {
            BatchError::Item { source, .. } => assert!(source.is_not_found()),
            BatchError::Worker(msg) => panic!("unexpected worker failure: {msg}"),
        }
    }

    #[tokio::test]
    async fn test_bulk_get_links_keyed_by_id() {
        let (_gateway, service) = memory_service(Duration::from_secs(3600));
        service
            .create_many(vec![file("one", "1"), file("two", "2")])
            .await
            .unwrap();

        let links = service
            .get_many(vec!["two".into(), "one".into(), "two".into()])
            .await
            .unwrap();

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].object_id, "two");
        assert_eq!(links[1].object_id, "one");
        assert!(links.iter().all(|l| l.link.expires_in == FETCH_LINK_TTL));
    }

    #[tokio::test]
    async fn test_create_abandons_signing_after_cancellation() {
        let mut mock = MockGateway::new();
        mock.expect_put().times(1).returning(|_key: &str, _body, _ct: &str| Ok(()));
        mock.expect_presigned_get_url().times(0);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = create_object(
            &mock,
            "late",
            Bytes::from("data"),
            Duration::from_secs(60),
            Some(&cancel),
        )
        .await;

        assert!(matches!(result, Err(ObjectError::Cancelled)));
    }

    #[tokio::test]
    async fn test_empty_bulk_request_succeeds() {
        let mock = MockGateway::new();
        let service = service(Arc::new(mock), Duration::from_secs(3600));

        assert!(service.create_many(Vec::new()).await.unwrap().is_empty());
        assert!(service.delete_many(Vec::new()).await.unwrap().is_empty());
    }
}
