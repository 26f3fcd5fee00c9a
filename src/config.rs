use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_GENERATION_MODEL: &str = "mistral:7b";
const DEFAULT_EMBEDDING_MODEL: &str = "mistral:7b-embed";
const DEFAULT_EMBEDDING_DIMENSION: usize = 4096;
const DEFAULT_CHUNK_TOKEN_BUDGET: usize = 500;
const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 60;
const DEFAULT_GENERATE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_EMBED_CONCURRENCY: usize = 4;
const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_QDRANT_COLLECTION: &str = "chatbot_chunks";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the chatbot backend.
///
/// Loaded once at process start and handed to each component constructor; nothing in the
/// library reads the environment on its own.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Ollama-compatible model server.
    pub base_url: String,
    /// Model used for answer generation.
    pub generation_model: String,
    /// Model used to embed chunks and questions.
    pub embedding_model: String,
    /// Dimensionality every stored embedding must have.
    pub embedding_dimension: usize,
    /// Token budget each chunk is packed up to.
    pub chunk_token_budget: usize,
    /// Timeout applied to each embedding request.
    pub request_timeout_embed: Duration,
    /// Timeout applied to each generation request.
    pub request_timeout_generate: Duration,
    /// Timeout applied to the liveness probe.
    pub request_timeout_probe: Duration,
    /// Maximum embedding requests in flight for one ingestion.
    pub embed_concurrency: usize,
    /// Largest accepted document, in bytes.
    pub max_document_bytes: usize,
    /// Storage backend holding chunk vectors.
    pub index_backend: IndexBackend,
    /// Chatbots reported as inactive by the tenant directory.
    pub inactive_chatbots: HashSet<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported similarity index backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBackend {
    /// Brute-force in-process index, optionally snapshotted to disk.
    Memory {
        /// JSON-lines file the index is loaded from and persisted to.
        snapshot_path: Option<PathBuf>,
    },
    /// Qdrant collection accessed over its REST API.
    Qdrant {
        /// Base URL of the Qdrant instance.
        url: String,
        /// Collection holding every tenant's chunks.
        collection: String,
        /// Optional API key sent as the `api-key` header.
        api_key: Option<String>,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            chunk_token_budget: DEFAULT_CHUNK_TOKEN_BUDGET,
            request_timeout_embed: Duration::from_secs(DEFAULT_EMBED_TIMEOUT_SECS),
            request_timeout_generate: Duration::from_secs(DEFAULT_GENERATE_TIMEOUT_SECS),
            request_timeout_probe: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            index_backend: IndexBackend::Memory {
                snapshot_path: None,
            },
            inactive_chatbots: HashSet::new(),
            server_port: None,
        }
    }
}

impl Config {
    /// Read `.env` (when present) and then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            base_url = %config.base_url,
            generation_model = %config.generation_model,
            embedding_model = %config.embedding_model,
            embedding_dimension = config.embedding_dimension,
            chunk_token_budget = config.chunk_token_budget,
            backend = ?config.index_backend,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chunk_token_budget = parse_or("CHUNK_SIZE", DEFAULT_CHUNK_TOKEN_BUDGET)?;
        if chunk_token_budget == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        let embedding_dimension = parse_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        let embed_concurrency = parse_or("EMBED_CONCURRENCY", DEFAULT_EMBED_CONCURRENCY)?;
        if embed_concurrency == 0 {
            return Err(ConfigError::InvalidValue("EMBED_CONCURRENCY".into()));
        }

        Ok(Self {
            base_url: load_env_optional("OLLAMA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            generation_model: load_env_optional("OLLAMA_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            embedding_model: load_env_optional("OLLAMA_EMBED_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension,
            chunk_token_budget,
            request_timeout_embed: Duration::from_secs(parse_or(
                "OLLAMA_EMBED_TIMEOUT_SECS",
                DEFAULT_EMBED_TIMEOUT_SECS,
            )?),
            request_timeout_generate: Duration::from_secs(parse_or(
                "OLLAMA_GENERATE_TIMEOUT_SECS",
                DEFAULT_GENERATE_TIMEOUT_SECS,
            )?),
            request_timeout_probe: Duration::from_secs(parse_or(
                "OLLAMA_PROBE_TIMEOUT_SECS",
                DEFAULT_PROBE_TIMEOUT_SECS,
            )?),
            embed_concurrency,
            max_document_bytes: parse_or("MAX_DOCUMENT_BYTES", DEFAULT_MAX_DOCUMENT_BYTES)?,
            index_backend: load_index_backend()?,
            inactive_chatbots: load_env_optional("INACTIVE_CHATBOTS")
                .map(|value| parse_list(&value))
                .unwrap_or_default(),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_index_backend() -> Result<IndexBackend, ConfigError> {
    let backend = load_env_optional("INDEX_BACKEND").unwrap_or_else(|| "memory".to_string());
    match backend.to_lowercase().as_str() {
        "memory" => Ok(IndexBackend::Memory {
            snapshot_path: load_env_optional("INDEX_SNAPSHOT_PATH").map(PathBuf::from),
        }),
        "qdrant" => Ok(IndexBackend::Qdrant {
            url: load_env("QDRANT_URL")?,
            collection: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_QDRANT_COLLECTION.to_string()),
            api_key: load_env_optional("QDRANT_API_KEY"),
        }),
        _ => Err(ConfigError::InvalidValue("INDEX_BACKEND".into())),
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
