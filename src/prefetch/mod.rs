//! Copies a model folder out of object storage into the local model directory.
//!
//! The copy is a plain paginated loop: the first listing or transfer error aborts the run.

pub mod memory;
pub mod s3;

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;

use crate::error::{Result, ServiceError};

pub use memory::MemoryStore;
pub use s3::S3Store;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Continuation token for the next page, `None` on the last page.
    pub next: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> anyhow::Result<ObjectPage>;

    /// Writes the object at `key` to `dest`, replacing any existing file.
    async fn download(&self, key: &str, dest: &Path) -> anyhow::Result<()>;
}

/// `folder` with exactly one trailing `/`.
pub fn normalize_prefix(folder: &str) -> String {
    if folder.ends_with('/') {
        folder.to_string()
    } else {
        format!("{folder}/")
    }
}

/// Local destination of `key`, relative to `prefix` under `dest_dir`.
pub fn local_path(dest_dir: &Path, prefix: &str, key: &str) -> anyhow::Result<PathBuf> {
    let relative = key
        .strip_prefix(prefix)
        .ok_or_else(|| anyhow!("key {key:?} is outside prefix {prefix:?}"))?;

    let relative = Path::new(relative);
    let mut components = relative.components().peekable();
    if components.peek().is_none() {
        return Err(anyhow!("key {key:?} has no file name"));
    }
    if !components.all(|c| matches!(c, Component::Normal(_))) {
        return Err(anyhow!("key {key:?} escapes the destination directory"));
    }

    Ok(dest_dir.join(relative))
}

/// Downloads every object under `folder` into `dest_dir`, preserving relative paths.
///
/// Folder markers (keys ending in `/`) are skipped. Returns the number of files written.
pub async fn prefetch_folder(store: &dyn ObjectStore, folder: &str, dest_dir: &Path) -> Result<usize> {
    let prefix = normalize_prefix(folder);
    tokio::fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))
        .map_err(ServiceError::transfer)?;

    let mut file_count = 0;
    let mut continuation = None;

    loop {
        let page = store
            .list_page(&prefix, continuation.take())
            .await
            .with_context(|| format!("listing objects under {prefix}"))
            .map_err(ServiceError::transfer)?;

        if page.keys.is_empty() {
            tracing::warn!("No files found under {}", prefix);
        }

        for key in page.keys.iter().filter(|key| !key.ends_with('/')) {
            let local_file = local_path(dest_dir, &prefix, key).map_err(ServiceError::transfer)?;
            if let Some(parent) = local_file.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))
                    .map_err(ServiceError::transfer)?;
            }

            tracing::info!("Downloading: {} -> {}", key, local_file.display());
            store
                .download(key, &local_file)
                .await
                .with_context(|| format!("downloading {key}"))
                .map_err(ServiceError::transfer)?;
            file_count += 1;
        }

        match page.next {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    Ok(file_count)
}
