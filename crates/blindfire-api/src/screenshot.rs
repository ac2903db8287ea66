use std::path::Path;

use anyhow::Result;
use async_compression::tokio::bufread::GzipEncoder;
use blindfire_types::models::FireBranch;
use tokio::fs;
use tokio::io::BufReader;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::scratch::ScratchFile;
use crate::storage::BlobStore;

/// Gzip an uploaded screenshot into the blob store under a fresh id.
///
/// The upload is deleted once this returns, whether or not the blob made it.
/// Returns the id only when the blob was stored; a failed write is logged and
/// the fire carries on without a screenshot.
pub async fn store_screenshot(
    store: &dyn BlobStore,
    upload: ScratchFile,
    branch: FireBranch,
) -> Option<Uuid> {
    let id = Uuid::new_v4();
    let name = branch.screenshot_name(id);

    let result = compress_into(store, upload.path(), &name).await;
    debug!("Gzip stream complete, deleting temp upload {}", upload.path().display());
    upload.remove().await;

    match result {
        Ok(bytes) => {
            debug!("Stored screenshot {} ({} bytes compressed)", name, bytes);
            Some(id)
        }
        Err(e) => {
            warn!("Failed to store screenshot {}: {:#}", name, e);
            None
        }
    }
}

async fn compress_into(store: &dyn BlobStore, source: &Path, name: &str) -> Result<u64> {
    let file = fs::File::open(source).await?;
    let mut gzip = GzipEncoder::new(BufReader::new(file));
    store.put(name, &mut gzip).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use async_compression::tokio::bufread::GzipDecoder;
    use async_trait::async_trait;
    use tokio::io::{AsyncRead, AsyncReadExt};

    struct BrokenStore;

    #[async_trait]
    impl BlobStore for BrokenStore {
        async fn put(&self, _name: &str, _body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64> {
            anyhow::bail!("disk full")
        }
    }

    async fn upload(dir: &Path, bytes: &[u8]) -> ScratchFile {
        let scratch = ScratchFile::unique_in(dir, "");
        fs::write(scratch.path(), bytes).await.unwrap();
        scratch
    }

    #[tokio::test]
    async fn stored_blob_decompresses_to_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let shots = tempfile::tempdir().unwrap();
        let store = LocalStore::new(shots.path().to_path_buf()).await.unwrap();

        let image: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let scratch = upload(tmp.path(), &image).await;
        let upload_path = scratch.path().to_path_buf();

        let id = store_screenshot(&store, scratch, FireBranch::Plaintext)
            .await
            .unwrap();

        assert!(!upload_path.exists());
        let compressed = fs::read(store.file_path(&format!("{id}.png.gz"))).await.unwrap();
        let mut decoder = GzipDecoder::new(&compressed[..]);
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).await.unwrap();
        assert_eq!(restored, image);
    }

    #[tokio::test]
    async fn encrypted_branch_uses_encrypted_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let shots = tempfile::tempdir().unwrap();
        let store = LocalStore::new(shots.path().to_path_buf()).await.unwrap();

        let scratch = upload(tmp.path(), b"-----BEGIN PGP MESSAGE-----").await;
        let id = store_screenshot(&store, scratch, FireBranch::Encrypted)
            .await
            .unwrap();

        assert!(store.file_path(&format!("{id}.b64png.enc.gz")).exists());
    }

    #[tokio::test]
    async fn failed_write_still_removes_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = upload(tmp.path(), b"png").await;
        let upload_path = scratch.path().to_path_buf();

        let id = store_screenshot(&BrokenStore, scratch, FireBranch::Plaintext).await;

        assert!(id.is_none());
        assert!(!upload_path.exists());
    }

    #[tokio::test]
    async fn distinct_fires_get_distinct_names() {
        let tmp = tempfile::tempdir().unwrap();
        let shots = tempfile::tempdir().unwrap();
        let store = LocalStore::new(shots.path().to_path_buf()).await.unwrap();

        let a = store_screenshot(&store, upload(tmp.path(), b"same").await, FireBranch::Plaintext).await;
        let b = store_screenshot(&store, upload(tmp.path(), b"same").await, FireBranch::Plaintext).await;

        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
    }
}
