use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::{ObjectPage, ObjectStore};
use crate::config::PrefetchConfig;

/// An S3 bucket, or any S3-compatible endpoint when `endpoint` is set.
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(config: &PrefetchConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "environment",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_owned))
            .collect();
        let next = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_owned)
        } else {
            None
        };

        Ok(ObjectPage { keys, next })
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(dest)
            .await
            .with_context(|| format!("opening {}", dest.display()))?;

        let mut body = output.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.with_context(|| format!("reading body of {key}"))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
