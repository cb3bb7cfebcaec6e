use std::path::Path;

use anyhow::{Context, Result};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use serde::Deserialize;

/// The sampling defaults shipped with a checkpoint in `generation_config.json`.
///
/// Only the keys that change decoding are read; a missing file means greedy decoding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub do_sample: bool,
    pub temperature: Option<f64>,
    pub top_k: Option<usize>,
    pub top_p: Option<f64>,
    #[serde(default)]
    pub eos_token_id: Option<TokenIds>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenIds {
    One(u32),
    Many(Vec<u32>),
}

impl TokenIds {
    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            Self::One(id) => vec![*id],
            Self::Many(ids) => ids.clone(),
        }
    }
}

impl GenerationConfig {
    pub fn from_model_dir(dir: &Path) -> Result<Self> {
        let path = dir.join("generation_config.json");
        if !path.exists() {
            tracing::debug!("no generation_config.json in {:?}, using greedy decoding", dir);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn eos_token_ids(&self) -> Vec<u32> {
        self.eos_token_id.as_ref().map(TokenIds::to_vec).unwrap_or_default()
    }

    pub fn sampling(&self) -> Sampling {
        let temperature = self.temperature.unwrap_or(1.0);
        if !self.do_sample || temperature <= 0.0 {
            return Sampling::ArgMax;
        }

        // top_k == 0 and top_p >= 1.0 disable the respective filter.
        let top_k = self.top_k.filter(|&k| k > 0);
        let top_p = self.top_p.filter(|&p| p < 1.0);

        match (top_k, top_p) {
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (None, None) => Sampling::All { temperature },
        }
    }

    pub fn logits_processor(&self, seed: u64) -> LogitsProcessor {
        LogitsProcessor::from_sampling(seed, self.sampling())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qwen3_generation_config_parses() {
        let config: GenerationConfig = serde_json::from_str(
            r#"{
                "bos_token_id": 151643,
                "do_sample": true,
                "eos_token_id": [151645, 151643],
                "pad_token_id": 151643,
                "temperature": 0.6,
                "top_k": 20,
                "top_p": 0.95,
                "transformers_version": "4.51.0"
            }"#,
        )
        .unwrap();

        assert_eq!(config.eos_token_ids(), vec![151645, 151643]);
        match config.sampling() {
            Sampling::TopKThenTopP { k, p, temperature } => {
                assert_eq!(k, 20);
                assert!((p - 0.95).abs() < 1e-9);
                assert!((temperature - 0.6).abs() < 1e-9);
            }
            other => panic!("unexpected sampling {other:?}"),
        }
    }

    #[test]
    fn single_eos_id_is_accepted() {
        let config: GenerationConfig = serde_json::from_str(r#"{"eos_token_id": 2}"#).unwrap();
        assert_eq!(config.eos_token_ids(), vec![2]);
    }

    #[test]
    fn greedy_without_sampling() {
        assert!(matches!(GenerationConfig::default().sampling(), Sampling::ArgMax));

        let config = GenerationConfig {
            do_sample: true,
            temperature: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(config.sampling(), Sampling::ArgMax));
    }

    #[test]
    fn disabled_filters_are_dropped() {
        let config = GenerationConfig {
            do_sample: true,
            temperature: Some(0.7),
            top_k: Some(0),
            top_p: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(config.sampling(), Sampling::All { .. }));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GenerationConfig::from_model_dir(dir.path()).unwrap();
        assert!(!config.do_sample);
        assert!(config.eos_token_ids().is_empty());
    }
}
