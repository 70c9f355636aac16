//! S3 Storage Gateway
//!
//! Backs the [`StorageGateway`] trait with the AWS SDK. Path-style addressing
//! is always used so that MinIO and other S3-compatible servers work without
//! DNS wildcard setup.
//!
//! # Tracing
//!
//! | Operation | Span Name | SDK calls |
//! |-----------|-----------|-----------|
//! | put | `storage.put` | PutObject |
//! | presigned_get_url | `storage.presign_get` | HeadObject + local SigV4 presign |
//! | remove | `storage.remove` | DeleteObject |
//! | ensure_bucket | `storage.ensure_bucket` | HeadBucket, CreateBucket |

use super::credentials::CredentialsProvider;
use super::{PresignedLink, StorageError, StorageGateway};
use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use bytes::Bytes;
use std::time::Duration;

/// Region that must not be sent as a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible Storage Gateway
pub struct S3Gateway {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3Gateway {
    /// Create a gateway from storage configuration
    ///
    /// Static keys from the configuration are used when present, otherwise
    /// the default AWS credential chain is loaded. No network calls are made.
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let credentials = CredentialsProvider::from_config(config)
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        let builder = match credentials {
            Some(creds) => aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(aws_credential_types::Credentials::from(creds)),
            None => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        let mut builder = builder
            .region(Region::new(config.region.clone()))
            .force_path_style(true);

        if let Some(endpoint) = config.endpoint_url() {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::debug!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint_url(),
            "Configured S3 gateway"
        );

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        })
    }

    /// Name of the bucket this gateway writes to
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Sign a GET request locally without checking that the object exists
    pub(crate) async fn presign_get(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedLink, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Signing {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Signing {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(PresignedLink::new(request.uri(), ttl))
    }
}

#[async_trait]
impl StorageGateway for S3Gateway {
    #[tracing::instrument(
        name = "storage.put",
        skip(self, body),
        fields(
            s3.bucket = %self.bucket,
            s3.key = %key,
            http.method = "PUT",
            http.content_type = %content_type,
            upload.bytes = body.len(),
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::backend("PutObject", key, DisplayErrorContext(&e).to_string()))?;

        if let Some(etag) = output.e_tag() {
            tracing::Span::current().record("s3.etag", etag);
        }

        tracing::debug!("PutObject completed");
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
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    StorageError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    StorageError::backend("HeadObject", key, DisplayErrorContext(&e).to_string())
                }
            })?;

        self.presign_get(key, ttl).await
    }

    #[tracing::instrument(
        name = "storage.remove",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.key = %key, http.method = "DELETE"),
        err
    )]
    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::backend("DeleteObject", key, DisplayErrorContext(&e).to_string())
            })?;

        tracing::debug!("DeleteObject completed");
        Ok(())
    }

    #[tracing::instrument(
        name = "storage.ensure_bucket",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.region = %self.region),
        err
    )]
    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::debug!("Bucket already exists");
                return Ok(());
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {}
            Err(e) => {
                return Err(StorageError::backend(
                    "HeadBucket",
                    &self.bucket,
                    DisplayErrorContext(&e).to_string(),
                ))
            }
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "Created bucket");
                Ok(())
            }
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(e) => Err(StorageError::backend(
                "CreateBucket",
                &self.bucket,
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }
}
