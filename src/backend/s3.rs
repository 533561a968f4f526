//! S3-compatible storage backend
use crate::backend::StorageBackend;
use crate::error::{DocError, DocResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::sync::Arc;
use tracing::{debug, error, info};

/// S3 storage backend
///
/// Supports AWS S3 and S3-compatible storage providers (MinIO, DigitalOcean Spaces, etc.)
#[derive(Clone)]
pub struct S3Backend {
    client: Arc<Client>,
    bucket: String,
    prefix: String,
}

/// Configuration for S3 storage
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-east-1")
    pub region: String,

    /// Custom endpoint for S3-compatible services
    /// Example: "https://nyc3.digitaloceanspaces.com" or "http://localhost:9000"
    pub endpoint: Option<String>,

    pub access_key_id: String,
    pub secret_access_key: String,

    /// Path prefix for all objects (default: "documents/")
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            prefix: "documents/".to_string(),
        }
    }
}

/// Object key for a document key under the configured prefix
fn object_key(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

impl S3Backend {
    /// Build a client for the configured bucket. No request is made here.
    pub async fn new(config: S3Config) -> DocResult<Self> {
        if config.bucket.is_empty() {
            return Err(DocError::Config("S3 bucket name cannot be empty".to_string()));
        }

        info!(
            "Initializing S3 storage (bucket: {}, region: {})",
            config.bucket, config.region
        );

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "docvault",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);
        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            // MinIO and most S3-compatible services need path-style addressing
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client: Arc::new(client),
            bucket: config.bucket,
            prefix: config.prefix,
        })
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn read(&self, key: &str) -> DocResult<Vec<u8>> {
        let object_key = object_key(&self.prefix, key);
        debug!("Downloading object from S3: {}", object_key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(DocError::NotFound(format!(
                        "No object {} in bucket {}",
                        object_key, self.bucket
                    )));
                }
                error!("Failed to download object from S3: {}", DisplayErrorContext(&service_error));
                return Err(DocError::Storage(format!(
                    "S3 download of {} failed: {}",
                    object_key,
                    DisplayErrorContext(&service_error)
                )));
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| DocError::Storage(format!("Failed to read S3 object {}: {}", object_key, e)))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} ({} bytes)", object_key, data.len());
        Ok(data)
    }

    async fn write(&self, key: &str, data: &[u8]) -> DocResult<()> {
        let object_key = object_key(&self.prefix, key);
        debug!("Uploading object to S3: {} ({} bytes)", object_key, data.len());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload object to S3: {}", DisplayErrorContext(&e));
                DocError::Storage(format!("S3 upload of {} failed: {}", object_key, DisplayErrorContext(&e)))
            })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> DocResult<()> {
        let object_key = object_key(&self.prefix, key);
        debug!("Deleting object from S3: {}", object_key);

        // S3 reports success for keys that do not exist
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                DocError::Storage(format!("S3 delete of {} failed: {}", object_key, DisplayErrorContext(&e)))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_uses_prefix() {
        assert_eq!(
            object_key("documents/", "2b1f4c0e-8d7a-4e0b-9a51-0c7d1e2f3a4b"),
            "documents/2b1f4c0e-8d7a-4e0b-9a51-0c7d1e2f3a4b"
        );
        assert_eq!(object_key("", "abc"), "abc");
    }

    #[test]
    fn test_s3_config_default() {
        let config = S3Config::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.prefix, "documents/");
        assert!(config.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_empty_bucket_rejected() {
        let result = S3Backend::new(S3Config::default()).await;
        assert!(matches!(result, Err(DocError::Config(_))));
    }
}
