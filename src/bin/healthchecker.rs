//! Container health probe: exits 0 iff the service reports a loaded model.

use anyhow::{anyhow, Result};
use std::process;
use std::time::Duration;

use qwen3_service::server::HealthResponse;

const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000";

#[tokio::main]
async fn main() {
    let service_url = std::env::var("SERVICE_URL").unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string());

    match check(&service_url).await {
        Ok(health) if health.model_loaded => {
            println!("{}: {}", service_url, health.status);
        }
        Ok(health) => {
            eprintln!("{}: {} (model not loaded)", service_url, health.status);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("{}: {:#}", service_url, e);
            process::exit(1);
        }
    }
}

async fn check(service_url: &str) -> Result<HealthResponse> {
    let url = format!("{}/health", service_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let res = client.get(&url).send().await?;
    if !res.status().is_success() {
        return Err(anyhow!("health check returned {}", res.status()));
    }

    Ok(res.json::<HealthResponse>().await?)
}
