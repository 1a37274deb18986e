//! Shares and their on-disk size.
//!
//! Size computation goes through [`ShareSizer`] so the scheduler can be
//! tested without touching the filesystem.

use crate::error::{AggregationError, EngineError, EngineResult};
use crate::storage::{Share, SyncStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_types::ShareName;
use walkdir::WalkDir;

/// Computes the size of a directory tree.
#[async_trait]
pub trait ShareSizer: Send + Sync {
    /// Total size in bytes of the regular files under `path`.
    async fn size_of(&self, path: &Path) -> Result<u64, AggregationError>;
}

/// Sums file sizes by walking the tree on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskUsage;

#[async_trait]
impl ShareSizer for DiskUsage {
    async fn size_of(&self, path: &Path) -> Result<u64, AggregationError> {
        let root = path.to_path_buf();
        tokio::task::spawn_blocking(move || dir_size(&root))
            .await
            .map_err(|e| AggregationError::Task(e.to_string()))?
    }
}

fn dir_size(root: &Path) -> Result<u64, AggregationError> {
    if !root.exists() {
        return Err(AggregationError::PathNotFound { path: root.to_path_buf() });
    }

    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| AggregationError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|source| AggregationError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Share registry and size refresh.
#[derive(Clone)]
pub struct ShareRegistry {
    store: Arc<dyn SyncStore>,
    sizer: Arc<dyn ShareSizer>,
}

impl ShareRegistry {
    /// Create a registry over a store and a sizer.
    pub fn new(store: Arc<dyn SyncStore>, sizer: Arc<dyn ShareSizer>) -> Self {
        Self { store, sizer }
    }

    /// Register a share. Its size stays unknown until the first refresh.
    pub async fn add(&self, name: ShareName, description: &str, path: PathBuf) -> EngineResult<()> {
        let inserted = self
            .store
            .insert_share(Share {
                name: name.clone(),
                description: description.to_string(),
                path,
                size: None,
            })
            .await?;

        if !inserted {
            return Err(EngineError::ShareExists {
                share: name.to_string(),
            });
        }
        tracing::info!("Added share {}", name);
        Ok(())
    }

    /// All shares, ordered by name.
    pub async fn list(&self) -> EngineResult<Vec<Share>> {
        Ok(self.store.list_shares().await?)
    }

    /// Look up a share. Client agents use this to learn their sync path.
    pub async fn get(&self, name: &ShareName) -> EngineResult<Share> {
        self.store
            .get_share(name)
            .await?
            .ok_or_else(|| unknown(name))
    }

    /// The share registered at `path`, if any.
    pub async fn by_path(&self, path: &Path) -> EngineResult<Option<Share>> {
        Ok(self.store.share_by_path(path).await?)
    }

    /// Unregister a share. Nothing on disk is touched.
    pub async fn remove(&self, name: &ShareName) -> EngineResult<()> {
        if !self.store.remove_share(name).await? {
            return Err(unknown(name));
        }
        tracing::info!("Removed share {}", name);
        Ok(())
    }

    /// Recompute and store the size of one share by name.
    pub async fn refresh(&self, name: &ShareName) -> EngineResult<u64> {
        let share = self.get(name).await?;
        self.refresh_share(&share).await
    }

    /// Recompute and store the size of `share`.
    pub async fn refresh_share(&self, share: &Share) -> EngineResult<u64> {
        let size = self.sizer.size_of(&share.path).await?;
        self.store.update_share_size(&share.name, size).await?;
        tracing::debug!("Share {} at {} is {} bytes", share.name, share.path.display(), size);
        Ok(size)
    }
}

fn unknown(name: &ShareName) -> EngineError {
    EngineError::UnknownShare {
        share: name.to_string(),
    }
}
