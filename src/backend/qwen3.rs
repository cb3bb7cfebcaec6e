//! Qwen3 checkpoints (safetensors) run with candle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::qwen3::{Config, ModelForCausalLM};
use parking_lot::Mutex;
use tokenizers::Tokenizer;

use super::{GenerationConfig, InferenceBackend, LoadedModel};
use crate::config::{DTypePreference, DevicePreference};
use crate::template::{ChatTemplate, Message};

/// Fallback stop tokens when the checkpoint has no `generation_config.json`.
const EOS_TOKENS: [&str; 2] = ["<|im_end|>", "<|endoftext|>"];

pub struct CandleBackend {
    device: DevicePreference,
    dtype: DTypePreference,
}

impl CandleBackend {
    pub fn new(device: DevicePreference, dtype: DTypePreference) -> Self {
        Self { device, dtype }
    }
}

impl Default for CandleBackend {
    fn default() -> Self {
        Self::new(DevicePreference::Auto, DTypePreference::Auto)
    }
}

impl InferenceBackend for CandleBackend {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedModel>> {
        let device = select_device(self.device)?;
        let dtype = select_dtype(self.dtype, &device);
        let model = Qwen3Model::load(path, device, dtype)?;
        Ok(Arc::new(model))
    }
}

pub fn select_device(preference: DevicePreference) -> Result<Device> {
    let device = match preference {
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                Device::new_cuda(0)?
            } else if candle_core::utils::metal_is_available() {
                Device::new_metal(0)?
            } else {
                Device::Cpu
            }
        }
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda(ordinal) => Device::new_cuda(ordinal)?,
        DevicePreference::Metal(ordinal) => Device::new_metal(ordinal)?,
    };
    Ok(device)
}

pub fn select_dtype(preference: DTypePreference, device: &Device) -> DType {
    match preference {
        DTypePreference::Auto if device.is_cpu() => DType::F32,
        DTypePreference::Auto | DTypePreference::Bf16 => DType::BF16,
        DTypePreference::F16 => DType::F16,
        DTypePreference::F32 => DType::F32,
    }
}

/// Weight files of a checkpoint: a single `model.safetensors` or the shards named by
/// `model.safetensors.index.json`.
pub fn weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let single = dir.join("model.safetensors");
    if single.exists() {
        return Ok(vec![single]);
    }

    let index_path = dir.join("model.safetensors.index.json");
    if !index_path.exists() {
        bail!("no model.safetensors or model.safetensors.index.json in {}", dir.display());
    }

    let content = std::fs::read_to_string(&index_path)
        .with_context(|| format!("reading {}", index_path.display()))?;
    let index: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", index_path.display()))?;
    let weight_map = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| anyhow!("{} has no weight_map", index_path.display()))?;

    let mut files: Vec<PathBuf> = weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(|name| dir.join(name))
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

pub struct Qwen3Model {
    model: Mutex<ModelForCausalLM>,
    tokenizer: Tokenizer,
    template: ChatTemplate,
    generation: GenerationConfig,
    eos_tokens: Vec<u32>,
    max_position_embeddings: usize,
    device: Device,
}

impl Qwen3Model {
    pub fn load(dir: &Path, device: Device, dtype: DType) -> Result<Self> {
        let start = Instant::now();
        tracing::info!("Loading model from {:?} ({:?} on {:?})", dir, dtype, device);

        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading {}", tokenizer_path.display()))?;

        let config_path = dir.join("config.json");
        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?,
        )
        .with_context(|| format!("parsing {}", config_path.display()))?;

        let template = ChatTemplate::from_model_dir(dir)?;
        let generation = GenerationConfig::from_model_dir(dir)?;

        let mut eos_tokens = generation.eos_token_ids();
        if eos_tokens.is_empty() {
            eos_tokens = EOS_TOKENS
                .iter()
                .filter_map(|t| tokenizer.token_to_id(t))
                .collect();
        }

        let files = weight_files(dir)?;
        // SAFETY: the weight files are not modified while the service runs.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files, dtype, &device)? };
        let model = ModelForCausalLM::new(&config, vb).context("building Qwen3 model")?;

        tracing::info!(
            "Model loaded in {:.2}s ({} weight files, eos {:?})",
            start.elapsed().as_secs_f64(),
            files.len(),
            eos_tokens
        );

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            template,
            generation,
            eos_tokens,
            max_position_embeddings: config.max_position_embeddings,
            device,
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(anyhow::Error::msg)?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl LoadedModel for Qwen3Model {
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<Vec<u32>> {
        let text = self.template.render(&[Message::user(prompt)], true)?;
        let mut tokens = self.encode(&text)?;
        let prompt_len = tokens.len();

        let mut processor = self.generation.logits_processor(rand::random());
        let mut model = self.model.lock();
        model.clear_kv_cache();

        let start = Instant::now();
        for index in 0..max_new_tokens {
            if tokens.len() >= self.max_position_embeddings {
                tracing::warn!(
                    "stopping at the {} token context limit",
                    self.max_position_embeddings
                );
                break;
            }

            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len() - context_size;
            let input = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = model.forward(&input, start_pos)?;
            let logits = logits.squeeze(0)?.squeeze(0)?.to_dtype(DType::F32)?;

            let next = processor.sample(&logits)?;
            tokens.push(next);
            if self.eos_tokens.contains(&next) {
                break;
            }
        }

        let generated = tokens.split_off(prompt_len);
        let elapsed = start.elapsed().as_secs_f64();
        tracing::debug!(
            "generated {} tokens from a {} token prompt in {:.2}s ({:.1} tok/s)",
            generated.len(),
            prompt_len,
            elapsed,
            generated.len() as f64 / elapsed.max(f64::EPSILON)
        );

        Ok(generated)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer.decode(ids, true).map_err(anyhow::Error::msg)
    }
}
