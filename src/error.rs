use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Generation was attempted before a successful load.
    #[error("Model not loaded")]
    NotReady,

    /// A well-formed request with values the model cannot serve.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("model load failed: {0}")]
    Load(String),

    #[error("{0}")]
    Generation(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Keeps the whole `anyhow` context chain in the message.
    pub fn load(err: anyhow::Error) -> Self {
        Self::Load(format!("{err:#}"))
    }

    pub fn generation(err: anyhow::Error) -> Self {
        Self::Generation(format!("{err:#}"))
    }

    pub fn transfer(err: anyhow::Error) -> Self {
        Self::Transfer(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
