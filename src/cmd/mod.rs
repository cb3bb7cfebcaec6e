use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use qwen3_service::progress::Spinner;
use qwen3_service::{server, CandleBackend, GenerationSession, ServiceConfig};

fn config_with(model_path: Option<PathBuf>) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(path) = model_path {
        config.model_path = path;
    }
    Ok(config)
}

pub async fn serve(host: Option<String>, port: Option<u16>, model_path: Option<PathBuf>) -> Result<()> {
    let mut config = config_with(model_path)?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    server::serve(config).await
}

pub async fn generate(prompt: &str, max_new_tokens: Option<usize>, model_path: Option<PathBuf>) -> Result<()> {
    let config = config_with(model_path)?;
    let backend = Arc::new(CandleBackend::new(config.device, config.dtype));
    let session = GenerationSession::from_config(backend, &config);

    let spinner = Spinner::start("Loading model");
    if let Err(e) = session.load().await {
        spinner.finish();
        return Err(e.into());
    }

    spinner.set_message("Generating");
    let start = Instant::now();
    let result = session.generate(prompt, max_new_tokens).await;
    spinner.finish();
    let result = result?;

    if !result.thinking.is_empty() {
        println!("--- thinking ---\n{}\n", result.thinking);
    }
    println!("--- content ---\n{}", result.content);
    println!("\n({:.2}s)", start.elapsed().as_secs_f64());

    Ok(())
}
