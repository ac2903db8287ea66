use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::config::StorageConfig;
use crate::scratch::ScratchFile;

/// Durable home for screenshot blobs.
///
/// Names are always freshly generated, so implementations never have to deal
/// with overwrites or concurrent writers to the same name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Copy `body` to the blob `name` and return the number of bytes stored.
    /// Only returns once the data is durable.
    async fn put(&self, name: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64>;
}

/// Build the store the configuration selects.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config {
        StorageConfig::Local { dir } => Arc::new(LocalStore::new(dir.clone()).await?),
        StorageConfig::Bucket {
            bucket,
            endpoint,
            token,
            staging_dir,
        } => Arc::new(
            BucketStore::new(
                bucket.clone(),
                endpoint.clone(),
                token.clone(),
                staging_dir.clone(),
            )
            .await?,
        ),
    };
    Ok(store)
}

/// Blobs as flat files at `{dir}/{name}`.
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Screenshot directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, name: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64> {
        let path = self.file_path(name);
        let result = async {
            let mut file = fs::File::create(&path).await?;
            let written = tokio::io::copy(&mut *body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(written)
        }
        .await;

        match result {
            Ok(written) => Ok(written),
            Err(e) => {
                // Never leave a truncated blob behind under a valid name.
                fs::remove_file(&path).await.ok();
                Err(e.into())
            }
        }
    }
}

/// Blobs in a Cloud Storage bucket, uploaded through the JSON API.
///
/// The body is staged on local disk first so the upload carries an exact
/// `Content-Length`; the staged copy is removed whatever the outcome.
pub struct BucketStore {
    client: reqwest::Client,
    bucket: String,
    endpoint: String,
    token: Option<String>,
    staging_dir: PathBuf,
}

impl BucketStore {
    pub async fn new(
        bucket: String,
        endpoint: String,
        token: Option<String>,
        staging_dir: PathBuf,
    ) -> Result<Self> {
        fs::create_dir_all(&staging_dir).await?;
        info!("Screenshot bucket: {} via {}", bucket, endpoint);
        Ok(Self {
            client: reqwest::Client::new(),
            bucket,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            staging_dir,
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.endpoint, self.bucket)
    }

    async fn upload(&self, name: &str, staged: &ScratchFile) -> Result<u64> {
        let len = fs::metadata(staged.path()).await?.len();
        let file = fs::File::open(staged.path()).await?;

        let mut req = self
            .client
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", name)])
            .header(CONTENT_TYPE, "application/gzip")
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("bucket upload of {} failed with {}: {}", name, status, detail);
        }

        info!("{} has been uploaded to bucket {}", name, self.bucket);
        Ok(len)
    }
}

#[async_trait]
impl BlobStore for BucketStore {
    async fn put(&self, name: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64> {
        let staged = ScratchFile::unique_in(&self.staging_dir, &format!(".{}", name));
        let staging = async {
            let mut file = fs::File::create(staged.path()).await?;
            tokio::io::copy(&mut *body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        let result = match staging {
            Ok(()) => self.upload(name, &staged).await,
            Err(e) => Err(e.into()),
        };
        staged.remove().await;
        result
    }
}
