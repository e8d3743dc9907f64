//! S3 backend built on aws-sdk-s3.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::{RemoteStore, StoreError};

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// AWS region, e.g. `eu-central-1`.
    pub region: String,
    /// Destination bucket, fixed per deployment.
    pub bucket: String,
    /// Custom endpoint for S3-compatible services. Enables path-style
    /// addressing.
    pub endpoint_url: Option<String>,
}

/// Uploads archives to a single S3 bucket.
///
/// Credentials come from the default provider chain.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Load the AWS configuration and build a client for `config`.
    pub async fn connect(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint_url.is_some())
            .build();

        debug!(
            region = %config.region,
            bucket = %config.bucket,
            custom_endpoint = config.endpoint_url.is_some(),
            "S3 client configured"
        );

        Self::with_client(Client::from_conf(s3_config), config.bucket.clone())
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// The destination bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn put_file(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::Open {
                path: local_path.to_path_buf(),
                source: Box::new(e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/gzip")
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Remote {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
