use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// A local file that only lives for the duration of one fire.
///
/// Removed by [`ScratchFile::remove`] on the normal path and by `Drop` on
/// every other one, so an early return or a panic never leaks an upload.
#[derive(Debug)]
pub struct ScratchFile {
    path: Option<PathBuf>,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// A fresh, not-yet-created path under `dir`.
    pub fn unique_in(dir: &Path, suffix: &str) -> Self {
        Self::new(dir.join(format!("{}{}", Uuid::new_v4(), suffix)))
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub async fn remove(mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match fs::remove_file(&path).await {
            Ok(()) => debug!("Removed scratch file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch file {}: {}", path.display(), e),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed scratch file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove scratch file {}: {}", path.display(), e),
            }
        }
    }
}
