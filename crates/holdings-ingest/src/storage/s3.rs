use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use super::{config::S3Config, ObjectLocation, ObjectMetadata, ObjectStore, StoredObject};
use crate::error::PipelineError;

/// S3-compatible object store (AWS S3, MinIO)
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn new(config: &S3Config) -> Result<Self> {
        debug!("Initializing S3 client with config: {:?}", config.endpoint);

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some((access_key, secret_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "holdings-ingest",
            ));
        }

        let sdk_config = loader.load().await;

        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "S3 client initialized");

        Ok(Self { client })
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<()> {
        let size = data.len();
        debug!("Uploading {} bytes to {}", size, location.uri());

        let mut request = self
            .client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(data));

        if !metadata.is_empty() {
            request = request.set_metadata(Some(metadata));
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to upload to {}", location.uri()))?;

        info!("Successfully uploaded {} ({} bytes)", location.uri(), size);
        Ok(())
    }

    async fn get_object(&self, location: &ObjectLocation) -> Result<StoredObject> {
        debug!("Downloading {}", location.uri());

        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", location.uri()))?;

        let metadata = response.metadata().cloned().unwrap_or_default();

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from {}", data.len(), location.uri());

        Ok(StoredObject { data, metadata })
    }

    async fn head_object(&self, location: &ObjectLocation) -> Result<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to get metadata for {}", location.uri()))?;

        Ok(response.metadata().cloned().unwrap_or_default())
    }

    async fn copy_object(&self, source: &ObjectLocation, destination: &ObjectLocation) -> Result<()> {
        debug!("Copying {} to {}", source.uri(), destination.uri());

        // Keys in copy sources must be URL-encoded (holding files contain spaces)
        let copy_source = format!("{}/{}", source.bucket, urlencoding::encode(&source.key));

        self.client
            .copy_object()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .copy_source(copy_source)
            .send()
            .await
            .with_context(|| format!("Failed to copy {} to {}", source.uri(), destination.uri()))?;

        info!(
            "Successfully copied {} to {}",
            source.uri(),
            destination.uri()
        );

        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        debug!("Listing objects in s3://{}/{}", bucket, prefix);

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context("Failed to list S3 objects")?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn object_exists(&self, location: &ObjectLocation) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(anyhow::Error::new(e)
                        .context(format!("Failed to check existence of {}", location.uri())))
                }
            },
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, data, metadata), fields(location = %location))]
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> crate::error::Result<()> {
        self.put_object(location, data, metadata)
            .await
            .map_err(PipelineError::storage)
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn get(&self, location: &ObjectLocation) -> crate::error::Result<StoredObject> {
        self.get_object(location).await.map_err(PipelineError::storage)
    }

    async fn head(&self, location: &ObjectLocation) -> crate::error::Result<ObjectMetadata> {
        self.head_object(location).await.map_err(PipelineError::storage)
    }

    #[instrument(skip(self), fields(source = %source, destination = %destination))]
    async fn copy(
        &self,
        source: &ObjectLocation,
        destination: &ObjectLocation,
    ) -> crate::error::Result<()> {
        self.copy_object(source, destination)
            .await
            .map_err(PipelineError::storage)
    }

    async fn list(&self, bucket: &str, prefix: &str) -> crate::error::Result<Vec<String>> {
        self.list_keys(bucket, prefix).await.map_err(PipelineError::storage)
    }

    async fn exists(&self, location: &ObjectLocation) -> crate::error::Result<bool> {
        self.object_exists(location).await.map_err(PipelineError::storage)
    }
}
