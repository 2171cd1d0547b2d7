//! Configuration loaded from environment variables.

use agent::RetryPolicy;
use secrecy::SecretString;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProviderKind {
    OpenAi,
    Ollama,
}

/// Helpdesk server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// `APP_ENV=development`; error responses then carry internal details.
    pub dev_mode: bool,
    pub database_url: String,
    pub vector_backend: VectorBackend,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<SecretString>,
    pub collection: String,
    pub embedding_dim: u64,
    pub ai_provider: AiProviderKind,
    pub ai_base_url: String,
    pub openai_api_key: Option<SecretString>,
    pub chat_model: String,
    pub summary_model: String,
    pub embedding_model: String,
    pub sendgrid_api_key: Option<SecretString>,
    pub sendgrid_from: String,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    pub task_max_duration: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HELPDESK_ADDR` | `127.0.0.1:3000` |
    /// | `APP_ENV` | `production` |
    /// | `DATABASE_URL` | `sqlite:helpdesk.db?mode=rwc` |
    /// | `VECTOR_BACKEND` | `qdrant` (or `memory`) |
    /// | `QDRANT_URL` | `http://localhost:6334` |
    /// | `QDRANT_API_KEY` | (none) |
    /// | `QDRANT_COLLECTION` | `kvn-knowledge-base` |
    /// | `EMBEDDING_DIM` | `1536` |
    /// | `AI_PROVIDER` | `openai` (or `ollama`) |
    /// | `AI_BASE_URL` | provider specific |
    /// | `OPENAI_API_KEY` | required for `openai` |
    /// | `CHAT_MODEL` | `gpt-4-turbo-preview` (ollama: `llama3`) |
    /// | `SUMMARY_MODEL` | `gpt-3.5-turbo` (ollama: `llama3`) |
    /// | `EMBEDDING_MODEL` | `text-embedding-ada-002` (ollama: `all-minilm`) |
    /// | `SENDGRID_API_KEY` | (none) |
    /// | `SENDGRID_FROM_EMAIL` | `suporte@exemplo.com` |
    /// | `KB_CHUNK_SIZE` | `1000` |
    /// | `RETRY_MAX_ATTEMPTS` | `3` |
    /// | `RETRY_BASE_MS` | `1000` |
    /// | `RETRY_CAP_MS` | `10000` |
    /// | `TASK_MAX_DURATION_SECS` | `300` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secret = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        let addr = var("HELPDESK_ADDR", "127.0.0.1:3000")
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let vector_backend = match var("VECTOR_BACKEND", "qdrant").to_lowercase().as_str() {
            "qdrant" => VectorBackend::Qdrant,
            "memory" => VectorBackend::Memory,
            other => return Err(ConfigError::unknown("VECTOR_BACKEND", other)),
        };

        let ai_provider = match var("AI_PROVIDER", "openai").to_lowercase().as_str() {
            "openai" => AiProviderKind::OpenAi,
            "ollama" => AiProviderKind::Ollama,
            other => return Err(ConfigError::unknown("AI_PROVIDER", other)),
        };
        let (default_base_url, default_chat, default_summary, default_embedding) = match ai_provider {
            AiProviderKind::OpenAi => (
                "https://api.openai.com/v1",
                "gpt-4-turbo-preview",
                "gpt-3.5-turbo",
                "text-embedding-ada-002",
            ),
            AiProviderKind::Ollama => ("http://localhost:11434", "llama3", "llama3", "all-minilm"),
        };

        let ai_base_url = var("AI_BASE_URL", default_base_url);
        let openai_api_key = secret("OPENAI_API_KEY");
        if ai_provider == AiProviderKind::OpenAi
            && openai_api_key.is_none()
            && ai_base_url.contains("api.openai.com")
        {
            return Err(ConfigError::MissingOpenAiKey);
        }

        let retry = RetryPolicy {
            max_attempts: number(&var("RETRY_MAX_ATTEMPTS", "3"), "RETRY_MAX_ATTEMPTS")?,
            base: Duration::from_millis(number(&var("RETRY_BASE_MS", "1000"), "RETRY_BASE_MS")?),
            cap: Duration::from_millis(number(&var("RETRY_CAP_MS", "10000"), "RETRY_CAP_MS")?),
            ..RetryPolicy::default()
        };

        Ok(Self {
            addr,
            dev_mode: var("APP_ENV", "production").eq_ignore_ascii_case("development"),
            database_url: var("DATABASE_URL", "sqlite:helpdesk.db?mode=rwc"),
            vector_backend,
            qdrant_url: var("QDRANT_URL", "http://localhost:6334"),
            qdrant_api_key: secret("QDRANT_API_KEY"),
            collection: var("QDRANT_COLLECTION", storage::qdrant::DEFAULT_COLLECTION),
            embedding_dim: number(&var("EMBEDDING_DIM", "1536"), "EMBEDDING_DIM")?,
            ai_provider,
            ai_base_url,
            openai_api_key,
            chat_model: var("CHAT_MODEL", default_chat),
            summary_model: var("SUMMARY_MODEL", default_summary),
            embedding_model: var("EMBEDDING_MODEL", default_embedding),
            sendgrid_api_key: secret("SENDGRID_API_KEY"),
            sendgrid_from: var("SENDGRID_FROM_EMAIL", mail::sendgrid::DEFAULT_FROM),
            chunk_size: number(&var("KB_CHUNK_SIZE", "1000"), "KB_CHUNK_SIZE")?,
            retry,
            task_max_duration: Duration::from_secs(number(
                &var("TASK_MAX_DURATION_SECS", "300"),
                "TASK_MAX_DURATION_SECS",
            )?),
        })
    }
}

fn number<T: std::str::FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid HELPDESK_ADDR format")]
    InvalidAddr,

    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("Unsupported {key}: {value}")]
    UnknownValue { key: &'static str, value: String },

    #[error("OPENAI_API_KEY environment variable is required")]
    MissingOpenAiKey,
}

impl ConfigError {
    fn unknown(key: &'static str, value: &str) -> Self {
        ConfigError::UnknownValue {
            key,
            value: value.to_string(),
        }
    }
}
