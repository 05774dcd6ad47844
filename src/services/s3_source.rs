//! S3-backed [`ObjectSource`].
//!
//! Works against AWS S3 and S3-compatible stores (MinIO, R2, ...) when an
//! endpoint override is configured.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{Builder, Region},
    error::{ProvideErrorMetadata, SdkError},
};
use std::path::Path;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use super::object_source::{ListPage, ObjectSource, PARTIAL_DOWNLOAD_PREFIX};
use crate::errors::{IngestError, IngestResult};

const DEFAULT_REGION: &str = "us-east-1";

/// S3 connection settings.
#[derive(Clone, Debug)]
pub struct S3Config {
    pub bucket: String,
    /// Region override; falls back to the environment's default chain.
    pub region: Option<String>,
    /// Custom endpoint URL (MinIO etc.). Implies path-style addressing.
    pub endpoint: Option<String>,
}

pub struct S3Source {
    client: Client,
    bucket: String,
}

impl S3Source {
    /// Build a client using credentials from the default AWS provider chain.
    pub async fn new(config: S3Config) -> Self {
        let sdk_config = aws_config::load_from_env().await;

        let region = config
            .region
            .map(Region::new)
            .or_else(|| sdk_config.region().cloned())
            .unwrap_or_else(|| Region::new(DEFAULT_REGION));

        let mut builder = Builder::from(&sdk_config).region(region);
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }

    fn transport_error(&self, key: &str, message: impl Into<String>) -> IngestError {
        IngestError::Transport {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// True when an SDK error means the object does not exist.
fn is_missing<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ServiceError(service) => {
            matches!(service.err().code(), Some("NoSuchKey" | "NotFound" | "404"))
        }
        _ => false,
    }
}

#[async_trait]
impl ObjectSource for S3Source {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, prefix: &str, token: Option<&str>) -> IngestResult<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);

        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let result = request.send().await.map_err(|e| IngestError::Listing {
            bucket: self.bucket.clone(),
            prefix: prefix.to_string(),
            message: e.to_string(),
        })?;

        let keys = result
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();

        let next_token = if result.is_truncated().unwrap_or(false) {
            result.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }

    async fn download(&self, key: &str, dest: &Path) -> IngestResult<u64> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_missing(&e) {
                    IngestError::ObjectNotFound {
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                    }
                } else {
                    self.transport_error(key, e.to_string())
                }
            })?;

        // Write under a temp name first so a half-written file never sits
        // at the staged path.
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = parent.join(format!("{}{}", PARTIAL_DOWNLOAD_PREFIX, Uuid::new_v4()));
        let mut file = fs::File::create(&tmp_path).await?;

        let mut body = result.body.into_async_read();
        let written = match tokio::io::copy(&mut body, &mut file).await {
            Ok(n) => n,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(self.transport_error(key, err.to_string()));
            }
        };
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(IngestError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, dest).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(IngestError::Io(err));
        }

        debug!("downloaded {} ({} bytes) to {}", key, written, dest.display());
        Ok(written)
    }
}
