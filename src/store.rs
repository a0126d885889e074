//! Persistence of measurement records.
//!
//! `STORE_PATH` names one destination: a local directory (`file://<dir>`),
//! handy for development, or an S3 bucket with an optional key prefix
//! (`s3://<bucket>[/<prefix>]`) for the cloud deployment. The two backends
//! fail differently. S3 failures are reported to the client as 503, while
//! local filesystem failures are returned as errors for the Lambda runtime to
//! deal with.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use serde::Serialize;
use std::{fmt, path::PathBuf, str::FromStr, sync::Arc};
use tracing::{error, info};

use crate::response::{Response, CONTENT_TYPE_JSON};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("STORE_PATH must be file://<dir> or s3://<bucket>[/<prefix>], got {0:?}")]
pub struct StorePathError(String);

/// Where results go.
#[derive(Clone, Debug, PartialEq)]
pub enum StorePath {
    LocalDirectory(PathBuf),
    ObjectStore {
        bucket: String,
        prefix: Option<String>,
    },
}

impl FromStr for StorePath {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, StorePathError> {
        let s = s.trim();
        let err = || StorePathError(s.to_owned());

        if let Some(dir) = s.strip_prefix("file://") {
            if dir.is_empty() {
                return Err(err());
            }

            return Ok(StorePath::LocalDirectory(PathBuf::from(dir)));
        }

        if let Some(rest) = s.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));

            if bucket.is_empty() {
                return Err(err());
            }

            let prefix = prefix
                .split('/')
                .filter(|seg| !seg.is_empty())
                .collect::<Vec<_>>()
                .join("/");

            return Ok(StorePath::ObjectStore {
                bucket: bucket.to_owned(),
                prefix: (!prefix.is_empty()).then_some(prefix),
            });
        }

        Err(err())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorePath::LocalDirectory(dir) => write!(f, "file://{}", dir.display()),
            StorePath::ObjectStore {
                bucket,
                prefix: Some(p),
            } => write!(f, "s3://{bucket}/{p}"),
            StorePath::ObjectStore {
                bucket,
                prefix: None,
            } => write!(f, "s3://{bucket}"),
        }
    }
}

/// The one object-storage operation we need.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

#[async_trait]
impl ObjectStore for aws_sdk_s3::Client {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await?;
        Ok(())
    }
}

/// A configured destination plus the client used to reach object storage.
#[derive(Clone)]
pub struct Store {
    path: StorePath,
    objects: Arc<dyn ObjectStore>,
}

impl Store {
    pub fn new(path: StorePath, objects: Arc<dyn ObjectStore>) -> Self {
        Store { path, objects }
    }

    /// Write `record` as JSON under `name`, returning the response to send.
    pub async fn persist<T: Serialize>(&self, name: &str, record: &T) -> Result<Response, StoreError> {
        let body = serde_json::to_vec(record)?;

        match &self.path {
            StorePath::LocalDirectory(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: dir.clone(),
                        source,
                    })?;

                let path = dir.join(name);
                tokio::fs::write(&path, body)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: path.clone(),
                        source,
                    })?;

                info!(path = %path.display(), "stored result");
            }

            StorePath::ObjectStore { bucket, prefix } => {
                let key = match prefix {
                    Some(p) => format!("{p}/{name}"),
                    None => name.to_owned(),
                };

                if let Err(e) = self.objects.put(bucket, &key, body, CONTENT_TYPE_JSON).await {
                    error!(%bucket, %key, "failed to upload result: {e:#}");
                    return Ok(Response::service_unavailable(None));
                }

                info!(%bucket, %key, "stored result");
            }
        }

        Ok(Response::created(None))
    }
}
