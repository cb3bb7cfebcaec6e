use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use super::{ObjectPage, ObjectStore};

/// In-process bucket with S3-style paginated listings.
pub struct MemoryStore {
    objects: BTreeMap<String, Vec<u8>>,
    page_size: usize,
    failing_keys: HashSet<String>,
    failing_listing: bool,
    downloads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            page_size: 1000,
            failing_keys: HashSet::new(),
            failing_listing: false,
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn with_object(mut self, key: &str, body: &[u8]) -> Self {
        self.objects.insert(key.to_string(), body.to_vec());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn failing_download(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage> {
        if self.failing_listing {
            return Err(anyhow!("AccessDenied: listing is not allowed"));
        }

        // The continuation token is the last key of the previous page.
        let keys: Vec<String> = self
            .objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.as_deref().map_or(true, |after| key.as_str() > after))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let next = if keys.len() > self.page_size {
            keys.get(self.page_size - 1).cloned()
        } else {
            None
        };
        let keys = keys.into_iter().take(self.page_size).collect();

        Ok(ObjectPage { keys, next })
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        if self.failing_keys.contains(key) {
            return Err(anyhow!("NoSuchKey: {key}"));
        }
        let body = self
            .objects
            .get(key)
            .ok_or_else(|| anyhow!("NoSuchKey: {key}"))?;

        tokio::fs::write(dest, body)
            .await
            .with_context(|| format!("writing {}", dest.display()))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
