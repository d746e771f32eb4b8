use std::ops::Deref;

use anyhow::Context;
use bytes::Bytes;
use opendal::{Operator, layers::LoggingLayer, services::Gcs};
use reqwest::Url;

use crate::config::AppConfig;

/// An object that has been written to the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// The name of the object in the bucket.
    pub name: String,
    /// The URL everyone can read the object from.
    pub public_url: String,
    /// The `gs://` URI the annotation services read the object from.
    pub source_uri: String,
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `name`, replacing any object with the same name,
    /// and make it publicly readable.
    async fn put(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> anyhow::Result<StoredObject>;
}

/// The name an upload is stored under.
///
/// Empty segments are dropped, as OpenDAL drops them when it writes.
/// Dot segments are rejected: GCS keeps them literally, but URLs resolve
/// them, so the public URL would name another object.
pub fn object_name(name: &str) -> anyhow::Result<String> {
    let segments: Vec<&str> = name.split('/').filter(|segment| !segment.is_empty()).collect();

    if segments.is_empty() {
        anyhow::bail!("Invalid object name {name:?}: it has no file name");
    }

    if segments.iter().any(|segment| *segment == "." || *segment == "..") {
        anyhow::bail!("Invalid object name {name:?}: `.` and `..` segments are not allowed");
    }

    Ok(segments.join("/"))
}

pub struct Storage {
    operator: Operator,
    bucket: String,
    public_base_url: Url,
}

impl Storage {
    pub fn new(operator: Operator, bucket: &str, public_base_url: &str) -> anyhow::Result<Self> {
        let public_base_url =
            Url::parse(public_base_url).context("Invalid public base URL of the storage")?;

        Ok(Self {
            operator,
            bucket: bucket.to_string(),
            public_base_url,
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        // every object written through this operator is world-readable
        let mut builder = Gcs::default()
            .bucket(&config.bucket)
            .root("/")
            .predefined_acl("publicRead");

        if let Some(credential_path) = &config.credential_path {
            builder = builder.credential_path(credential_path);
        }

        let operator = Operator::new(builder)
            .context("Failed to build OpenDAL operator for GCS")?
            .layer(LoggingLayer::default())
            .finish();

        Self::new(operator, &config.bucket, &config.public_base_url)
    }

    /// The public URL of an object; `name` must come from [`object_name`].
    pub fn public_url(&self, name: &str) -> anyhow::Result<String> {
        let mut url = self.public_base_url.clone();

        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("The public base URL cannot hold a path"))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(name.split('/'));

        Ok(url.to_string())
    }

    pub fn source_uri(&self, name: &str) -> String {
        format!("gs://{}/{}", self.bucket, name)
    }
}

#[async_trait::async_trait]
impl ObjectStore for Storage {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> anyhow::Result<StoredObject> {
        let name = object_name(name)?;
        let mut write = self.operator.write_with(&name, bytes);

        if let Some(content_type) = content_type {
            if self.operator.info().full_capability().write_with_content_type {
                write = write.content_type(content_type);
            }
        }

        write
            .await
            .with_context(|| format!("Failed to upload {name} to bucket {}", self.bucket))?;

        tracing::info!("Uploaded {name} to bucket {}", self.bucket);

        Ok(StoredObject {
            public_url: self.public_url(&name)?,
            source_uri: self.source_uri(&name),
            name,
        })
    }
}

impl Deref for Storage {
    type Target = Operator;

    fn deref(&self) -> &Self::Target {
        &self.operator
    }
}
