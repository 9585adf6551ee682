//! Image storage backends.
//!
//! Uploaded images go either to an S3-compatible bucket or to a local directory
//! served by the API itself under `/uploads/{key}`. Keys have the form
//! `professionals/{professional_id}/{uuid}.{ext}`.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::{Client as S3Client, primitives::ByteStream};
use bytes::Bytes;
use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, instrument};
use url::Url;

use crate::{config::StorageConfig, errors::Error, types::ProfessionalId};

/// Content types accepted for uploads
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(_) => Error::BadRequest { message: err.to_string() },
            StorageError::Io(_) | StorageError::ObjectStore(_) => Error::Internal {
                operation: format!("store image: {err}"),
            },
        }
    }
}

/// Where uploaded image bytes live
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the object and return its public URL
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<String, StorageError>;

    /// Remove the object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Build the configured store
pub async fn create_store(config: &StorageConfig, public_url: &Url) -> Result<Arc<dyn ImageStore>, StorageError> {
    match config {
        StorageConfig::S3 {
            bucket,
            region,
            endpoint,
            public_base_url,
            prefix,
        } => {
            let store = S3ImageStore::connect(
                bucket.clone(),
                region.clone(),
                endpoint.clone(),
                public_base_url.clone(),
                prefix.clone(),
            )
            .await;
            Ok(Arc::new(store))
        }
        StorageConfig::Local { path } => Ok(Arc::new(LocalImageStore::new(path, public_url)?)),
    }
}

/// Whether the content type may be uploaded
pub fn is_allowed_image_type(content_type: &str) -> bool {
    ALLOWED_IMAGE_TYPES.contains(&content_type.to_ascii_lowercase().as_str())
}

/// Fresh object key for a professional's image
pub fn image_key(professional_id: ProfessionalId, content_type: &str) -> String {
    let extension = match content_type {
        "image/jpeg" => "jpg",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|extensions| extensions.first())
            .copied()
            .unwrap_or("bin"),
    };
    format!("professionals/{professional_id}/{}.{extension}", uuid::Uuid::new_v4())
}

/// Recover the object key from a URL returned by [`ImageStore::put`]
pub fn key_from_url(url: &str) -> Option<&str> {
    let start = url.find("professionals/")?;
    let key = &url[start..];
    validate_key(key).ok().map(|_| key)
}

/// Reject keys that could escape the storage root
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let path = Path::new(key);
    let safe = !key.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

pub struct S3ImageStore {
    client: S3Client,
    bucket: String,
    public_base_url: String,
    prefix: String,
}

impl S3ImageStore {
    pub async fn connect(
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        public_base_url: Option<Url>,
        prefix: String,
    ) -> Self {
        let region_provider = RegionProviderChain::first_try(region.map(aws_sdk_s3::config::Region::new))
            .or_default_provider()
            .or_else("us-east-1");
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
        // S3-compatible stores (MinIO, R2, ...) need path-style addressing
        if let Some(endpoint) = endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint).force_path_style(true);
        }

        let public_base_url = public_base_url
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{bucket}.s3.amazonaws.com"));

        Self {
            client: S3Client::from_conf(s3_config_builder.build()),
            bucket,
            public_base_url,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.prefix)
        }
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    #[instrument(skip(self, data), fields(size = data.len()), err)]
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<String, StorageError> {
        validate_key(key)?;
        let object_key = self.object_key(key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;

        Ok(format!("{}/{object_key}", self.public_base_url))
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        Ok(())
    }
}

/// Stores images under a local directory
pub struct LocalImageStore {
    root: PathBuf,
    base_url: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &Url) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url: format!("{}/uploads", public_url.as_str().trim_end_matches('/')),
        })
    }

    /// Path of a stored object, if the key is well-formed
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    #[instrument(skip(self, data), fields(size = data.len()), err)]
    async fn put(&self, key: &str, _content_type: &str, data: Bytes) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        debug!(path = %path.display(), "Stored image locally");
        Ok(format!("{}/{key}", self.base_url))
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
