//! Fetches the model folder from S3 into `MODEL_PATH` before the service starts.

use std::process;

use qwen3_service::prefetch::{normalize_prefix, prefetch_folder, S3Store};
use qwen3_service::PrefetchConfig;

#[tokio::main]
async fn main() {
    qwen3_service::init_logging();

    let config = PrefetchConfig::from_env();
    let prefix = normalize_prefix(&config.folder);
    let store = S3Store::new(&config);

    tracing::info!("Downloading folder from s3://{}/{}", store.bucket(), prefix);

    match prefetch_folder(&store, &config.folder, &config.dest_dir).await {
        Ok(file_count) => {
            tracing::info!(
                "Successfully downloaded {} files from s3://{}/{}",
                file_count,
                store.bucket(),
                prefix
            );
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            process::exit(1);
        }
    }
}
