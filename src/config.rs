use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::error::{Result, ServiceError};

pub const DEFAULT_MODEL_PATH: &str = "/app/model";
pub const DEFAULT_MAX_NEW_TOKENS: usize = 32768;
/// `</think>` in the Qwen3 vocabulary.
pub const DEFAULT_THINK_END_TOKEN_ID: u32 = 151668;
pub const DEFAULT_S3_FOLDER: &str = "qwen3-0.6b/";

/// Where the model is placed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    /// First accelerator that is available, otherwise the CPU.
    Auto,
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl std::str::FromStr for DevicePreference {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let ordinal = |rest: &str| -> Result<usize> {
            if rest.is_empty() {
                return Ok(0);
            }
            rest.trim_start_matches(':')
                .parse()
                .map_err(|_| ServiceError::Config(format!("invalid device ordinal in {s:?}")))
        };

        match s.as_str() {
            "auto" | "" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            _ if s.starts_with("cuda") => Ok(Self::Cuda(ordinal(&s[4..])?)),
            _ if s.starts_with("metal") => Ok(Self::Metal(ordinal(&s[5..])?)),
            _ => Err(ServiceError::Config(format!("unknown device {s:?}"))),
        }
    }
}

/// Numeric format of the loaded weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DTypePreference {
    /// bf16 on an accelerator, f32 on the CPU.
    Auto,
    Bf16,
    F16,
    F32,
}

impl std::str::FromStr for DTypePreference {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "bf16" | "bfloat16" => Ok(Self::Bf16),
            "f16" | "float16" => Ok(Self::F16),
            "f32" | "float32" => Ok(Self::F32),
            other => Err(ServiceError::Config(format!("unknown dtype {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub max_new_tokens: usize,
    pub think_end_token_id: u32,
    pub device: DevicePreference,
    pub dtype: DTypePreference,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            think_end_token_id: DEFAULT_THINK_END_TOKEN_ID,
            device: DevicePreference::Auto,
            dtype: DTypePreference::Auto,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            if let Some((h, p)) = host.rsplit_once(':') {
                config.host = h.to_string();
                config.port = parse_var("HOST", p)?;
            } else {
                config.host = host;
            }
        }

        if let Ok(port) = env::var("PORT") {
            config.port = parse_var("PORT", &port)?;
        }

        config.model_path = model_path();

        if let Ok(tokens) = env::var("MAX_NEW_TOKENS") {
            config.max_new_tokens = parse_var::<NonZeroUsize>("MAX_NEW_TOKENS", &tokens)?.get();
        }

        if let Ok(id) = env::var("THINK_END_TOKEN_ID") {
            config.think_end_token_id = parse_var("THINK_END_TOKEN_ID", &id)?;
        }

        if let Ok(device) = env::var("DEVICE") {
            config.device = device.parse()?;
        }

        if let Ok(dtype) = env::var("DTYPE") {
            config.dtype = dtype.parse()?;
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings for the offline S3 prefetch.
#[derive(Clone)]
pub struct PrefetchConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub folder: String,
    pub dest_dir: PathBuf,
}

impl std::fmt::Debug for PrefetchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("folder", &self.folder)
            .field("dest_dir", &self.dest_dir)
            .finish_non_exhaustive()
    }
}

impl PrefetchConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").unwrap_or_default(),
            access_key: env::var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: env::var("S3_SECRET_KEY").unwrap_or_default(),
            bucket: env::var("S3_BUCKET").unwrap_or_default(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            folder: env::var("S3_FOLDER").unwrap_or_else(|_| DEFAULT_S3_FOLDER.to_string()),
            dest_dir: model_path(),
        }
    }
}

/// `MODEL_PATH` with a leading `~/` expanded, or the container default.
pub fn model_path() -> PathBuf {
    let path = env::var("MODEL_PATH").unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string());
    expand_home(&path)
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ServiceError::Config(format!("invalid value for {name}: {value:?}")))
}
