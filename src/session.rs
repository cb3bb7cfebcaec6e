//! Model lifecycle and the generate-then-split operation.
//!
//! A session moves `Unloaded -> Loading -> Ready` once. Loads are serialized, so callers
//! racing on `load` end up sharing the first successful load. A failed load goes back to
//! `Unloaded`; nothing ever leaves `Ready`.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::backend::{InferenceBackend, LoadedModel};
use crate::config::{ServiceConfig, DEFAULT_MAX_NEW_TOKENS, DEFAULT_THINK_END_TOKEN_ID};
use crate::error::{Result, ServiceError};
use crate::thinking::{self, ThinkingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unloaded,
    Loading,
    Ready,
}

enum LoadState {
    Unloaded,
    Loading,
    Ready(Arc<dyn LoadedModel>),
}

/// Puts a `Loading` session back to `Unloaded` when the load future is dropped mid-flight.
struct LoadingGuard<'a> {
    state: &'a RwLock<LoadState>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.write();
        if matches!(*state, LoadState::Loading) {
            tracing::warn!("Model load interrupted");
            *state = LoadState::Unloaded;
        }
    }
}

pub struct GenerationSession {
    backend: Arc<dyn InferenceBackend>,
    model_path: PathBuf,
    think_end_token_id: u32,
    default_max_tokens: usize,
    state: RwLock<LoadState>,
    load_lock: Mutex<()>,
}

impl GenerationSession {
    pub fn new(backend: Arc<dyn InferenceBackend>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            model_path: model_path.into(),
            think_end_token_id: DEFAULT_THINK_END_TOKEN_ID,
            default_max_tokens: DEFAULT_MAX_NEW_TOKENS,
            state: RwLock::new(LoadState::Unloaded),
            load_lock: Mutex::new(()),
        }
    }

    pub fn from_config(backend: Arc<dyn InferenceBackend>, config: &ServiceConfig) -> Self {
        Self::new(backend, config.model_path.clone())
            .with_think_end_token(config.think_end_token_id)
            .with_default_max_tokens(config.max_new_tokens)
    }

    pub fn with_think_end_token(mut self, id: u32) -> Self {
        self.think_end_token_id = id;
        self
    }

    pub fn with_default_max_tokens(mut self, max_tokens: usize) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn model_path(&self) -> &std::path::Path {
        &self.model_path
    }

    pub fn status(&self) -> SessionStatus {
        match &*self.state.read() {
            LoadState::Unloaded => SessionStatus::Unloaded,
            LoadState::Loading => SessionStatus::Loading,
            LoadState::Ready(_) => SessionStatus::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// Loads tokenizer and model from the configured directory.
    ///
    /// Returns immediately when already loaded. The backend error is returned as
    /// [`ServiceError::Load`] and leaves the session unloaded.
    pub async fn load(&self) -> Result<()> {
        let _guard = self.load_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        *self.state.write() = LoadState::Loading;
        let mut loading = LoadingGuard {
            state: &self.state,
            armed: true,
        };
        tracing::info!("Loading model from {:?}", self.model_path);

        let backend = Arc::clone(&self.backend);
        let path = self.model_path.clone();
        let loaded = tokio::task::spawn_blocking(move || backend.load(&path)).await;
        loading.armed = false;

        let mut state = self.state.write();
        match loaded {
            Ok(Ok(model)) => {
                *state = LoadState::Ready(model);
                tracing::info!("Model loaded successfully");
                Ok(())
            }
            Ok(Err(err)) => {
                *state = LoadState::Unloaded;
                tracing::error!("Error loading model: {:#}", err);
                Err(ServiceError::load(err))
            }
            Err(join_err) => {
                *state = LoadState::Unloaded;
                tracing::error!("Model load task failed: {}", join_err);
                Err(ServiceError::Load(join_err.to_string()))
            }
        }
    }

    /// Generates a reply to `prompt` and splits it at the end-of-thinking token.
    ///
    /// `max_tokens` defaults to the session budget (32768 unless configured) and must be
    /// at least 1.
    pub async fn generate(&self, prompt: &str, max_tokens: Option<usize>) -> Result<ThinkingResult> {
        let model = match &*self.state.read() {
            LoadState::Ready(model) => Arc::clone(model),
            _ => return Err(ServiceError::NotReady),
        };

        let budget = max_tokens.unwrap_or(self.default_max_tokens);
        if budget == 0 {
            return Err(ServiceError::InvalidRequest(
                "max_new_tokens must be at least 1".to_string(),
            ));
        }
        let sentinel = self.think_end_token_id;
        let prompt = prompt.to_owned();

        let result = tokio::task::spawn_blocking(move || {
            let ids = model.generate(&prompt, budget)?;
            tracing::debug!("generated {} tokens", ids.len());
            thinking::split_and_decode(&ids, sentinel, |span| model.decode(span))
        })
        .await
        .map_err(|e| ServiceError::Generation(e.to_string()))?;

        result.map_err(|err| {
            tracing::error!("Generation failed: {:#}", err);
            ServiceError::generation(err)
        })
    }
}
