pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod prefetch;
pub mod progress;
pub mod server;
pub mod session;
pub mod template;
pub mod thinking;

pub use backend::{CandleBackend, InferenceBackend, LoadedModel, MockBackend};
pub use config::{PrefetchConfig, ServiceConfig};
pub use error::{Result, ServiceError};
pub use session::{GenerationSession, SessionStatus};
pub use thinking::ThinkingResult;

/// Installs the `tracing` subscriber used by every binary. `RUST_LOG` overrides `info`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
