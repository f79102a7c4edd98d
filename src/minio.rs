//! MinIO / S3-compatible object storage client management

#[cfg(feature = "minio")]
use std::sync::Arc;

#[cfg(feature = "minio")]
use object_store::aws::AmazonS3Builder;
#[cfg(feature = "minio")]
use object_store::ObjectStore;

use crate::{config::MinioConfig, error::{Error, Result}};

/// Shared handle type returned by handlers; `object_store::ObjectStore` is
/// already `Send + Sync` and cheaply cloneable behind an `Arc`.
#[cfg(feature = "minio")]
pub type MinioClient = Arc<dyn ObjectStore>;

/// Build a MinIO/S3-compatible object store client.
///
/// This is an internal function used by the pool agent.
#[cfg(feature = "minio")]
pub(crate) async fn create_client(config: &MinioConfig) -> Result<MinioClient> {
    let mut builder = AmazonS3Builder::new()
        .with_endpoint(&config.endpoint)
        .with_bucket_name(&config.bucket)
        .with_allow_http(config.endpoint.starts_with("http://"))
        .with_virtual_hosted_style_request(!config.path_style);

    if let Some(access_key) = &config.access_key {
        builder = builder.with_access_key_id(access_key);
    }
    if let Some(secret_key) = &config.secret_key {
        builder = builder.with_secret_access_key(secret_key);
    }

    let store = builder.build().map_err(|e| {
        Error::External(format!(
            "Failed to build MinIO client for endpoint '{}', bucket '{}'\n\n\
            Troubleshooting:\n\
            1. Verify the endpoint is reachable: curl -I {}\n\
            2. Check the bucket exists and credentials have access to it\n\
            3. Verify path_style matches your deployment (self-hosted MinIO typically needs path_style=true)\n\n\
            Error: {}",
            config.endpoint, config.bucket, config.endpoint, e
        ))
    })?;

    // `build()` only validates configuration; confirm the bucket is actually
    // reachable before handing the client back to the pool agent.
    store
        .list_with_delimiter(None)
        .await
        .map_err(|e| Error::External(format!("Failed to reach MinIO bucket '{}': {}", config.bucket, e)))?;

    Ok(Arc::new(store))
}
