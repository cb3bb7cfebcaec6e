//! Inference capability used by the generation session.
//!
//! The session only needs two things from a backend: turn a model directory into a loaded
//! handle, and turn a prompt into newly generated token ids (plus decoding them back).

pub mod generation;
pub mod mock;
pub mod qwen3;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

pub use generation::GenerationConfig;
pub use mock::MockBackend;
pub use qwen3::CandleBackend;

/// Loads model handles from a directory on disk.
pub trait InferenceBackend: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedModel>>;
}

/// A tokenizer and model pair ready to serve requests.
pub trait LoadedModel: Send + Sync {
    /// Renders `prompt` as a single user turn with thinking enabled and returns only the
    /// newly generated token ids, at most `max_new_tokens` of them.
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<Vec<u32>>;

    /// Decodes ids with special tokens skipped.
    fn decode(&self, ids: &[u32]) -> Result<String>;
}
