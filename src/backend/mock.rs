//! Scripted backend for exercising the session and the HTTP layer without weights.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::{InferenceBackend, LoadedModel};

#[derive(Default)]
struct Counters {
    loads: AtomicUsize,
    generations: AtomicUsize,
    last_budget: AtomicUsize,
}

/// Always "generates" the same ids. Ids decode through `vocab`, ids in `special` decode to
/// nothing and unknown ids decode to `[id]`.
#[derive(Clone, Default)]
pub struct MockBackend {
    output: Vec<u32>,
    vocab: HashMap<u32, String>,
    special: HashSet<u32>,
    failing_loads: Arc<AtomicUsize>,
    generation_error: Option<String>,
    load_delay: Duration,
    counters: Arc<Counters>,
}

impl MockBackend {
    pub fn new(output: Vec<u32>) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn with_vocab<'a>(mut self, entries: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        self.vocab
            .extend(entries.into_iter().map(|(id, text)| (id, text.to_string())));
        self
    }

    pub fn with_special(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.special.extend(ids);
        self
    }

    /// The first `n` loads fail.
    pub fn failing_loads(self, n: usize) -> Self {
        self.failing_loads.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_generation(mut self, message: &str) -> Self {
        self.generation_error = Some(message.to_string());
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn load_calls(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.counters.generations.load(Ordering::SeqCst)
    }

    pub fn last_max_new_tokens(&self) -> usize {
        self.counters.last_budget.load(Ordering::SeqCst)
    }
}

impl InferenceBackend for MockBackend {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedModel>> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }

        let should_fail = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(anyhow!("no model files in {}", path.display()));
        }

        Ok(Arc::new(self.clone()))
    }
}

impl LoadedModel for MockBackend {
    fn generate(&self, _prompt: &str, max_new_tokens: usize) -> Result<Vec<u32>> {
        self.counters.generations.fetch_add(1, Ordering::SeqCst);
        self.counters
            .last_budget
            .store(max_new_tokens, Ordering::SeqCst);

        if let Some(message) = &self.generation_error {
            return Err(anyhow!("{message}"));
        }

        Ok(self.output.iter().copied().take(max_new_tokens).collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(ids
            .iter()
            .filter(|id| !self.special.contains(*id))
            .map(|id| {
                self.vocab
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("[{id}]"))
            })
            .collect())
    }
}
