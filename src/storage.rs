//! Blob store boundary for document files.
//!
//! Everything in the bucket is a PDF. Admin uploads write an object once
//! under a caller-generated key, hard deletes remove it, and entitled
//! readers receive short-lived presigned URLs instead of the object itself.

use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use std::fmt::Display;
use std::time::Duration;
use tracing::error;

use crate::error::ApiError;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Presigned download URLs expire after ten minutes; every entitled
/// request mints a fresh one.
pub const DOWNLOAD_URL_TTL_SECS: u64 = 600;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Stores an uploaded PDF under `key`.
    async fn put_pdf(&self, key: &str, body: Bytes) -> Result<(), ApiError>;

    /// Removes the object behind a hard-deleted document.
    async fn delete_object(&self, key: &str) -> Result<(), ApiError>;

    /// Mints a download URL valid for [`DOWNLOAD_URL_TTL_SECS`].
    async fn presign_download(&self, key: &str) -> Result<String, ApiError>;
}

/// S3/MinIO-backed implementation.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> Self {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        // MinIO requires path-style addressing.
        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_pdf(&self, key: &str, body: Bytes) -> Result<(), ApiError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(PDF_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| storage_err("upload", key, e))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ApiError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_err("delete", key, e))?;
        Ok(())
    }

    async fn presign_download(&self, key: &str) -> Result<String, ApiError> {
        let expiry = PresigningConfig::expires_in(Duration::from_secs(DOWNLOAD_URL_TTL_SECS))
            .map_err(|e| storage_err("presign", key, e))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(expiry)
            .await
            .map_err(|e| storage_err("presign", key, e))?;
        Ok(presigned.uri().to_string())
    }
}

/// The SDK error is logged with the key; the client only learns which
/// operation failed.
fn storage_err(op: &'static str, key: &str, e: impl Display) -> ApiError {
    error!(error = %e, key, op, "storage request failed");
    ApiError::Provider(format!("storage {op} failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_surface_as_provider_errors() {
        let err = storage_err("upload", "a/b.pdf", "connection refused");
        match err {
            ApiError::Provider(msg) => assert_eq!(msg, "storage upload failed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
