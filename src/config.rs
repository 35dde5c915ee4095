//! Environment-style configuration.
//!
//! All settings are read from the process environment (a `.env` file is
//! honored via `dotenvy`) into a validated [`Config`]. The config object is
//! built once at startup and passed by reference everywhere; nothing in the
//! crate reads the environment after that.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
    pub web_search: WebSearchConfig,
    pub generation: GenerationConfig,
    pub queue: QueueConfig,
    pub watch: WatchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embeddings endpoint, or None to
    /// leave retrieval without a query embedder (fail-soft, empty results).
    pub api_base: Option<String>,
    pub model: String,
    /// Expected vector width; when set, ingest rejects vectors of any
    /// other length instead of storing an inconsistent collection.
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RerankConfig {
    /// Base URL of a rerank endpoint (`POST {base}/v1/rerank`), or None to
    /// pass retrieval-order results through unscored.
    pub api_base: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub api_base: Option<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// None when OPENAI_API_KEY is absent; the worker then answers with
    /// retrieved passages and an explanatory note.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub workers: usize,
    pub result_ttl_secs: u64,
    pub session_history_max: usize,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub enabled: bool,
    pub debounce_secs: f64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => bail!("invalid value for {key}: {other:?} (expected true/false)"),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let workers_default = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let config = Config {
            db: DbConfig {
                path: PathBuf::from(env_str("DB_PATH", "./ragserve.db")),
                collection: env_str("COLLECTION", "faq"),
            },
            chunking: ChunkingConfig {
                chunk_chars: env_parse("CHUNK_CHARS", 1000)?,
                overlap_chars: env_parse("CHUNK_OVERLAP", 150)?,
            },
            retrieval: RetrievalConfig {
                top_k: env_parse("TOP_K", 5)?,
                data_dir: PathBuf::from(env_str("DATA_DIR", "./data")),
            },
            embedding: EmbeddingConfig {
                api_base: env_opt("EMBED_API_BASE"),
                model: env_str("EMBED_MODEL", "all-MiniLM-L6-v2"),
                dims: env_opt("EMBED_DIMS")
                    .map(|raw| {
                        raw.parse::<usize>()
                            .with_context(|| format!("invalid value for EMBED_DIMS: {raw:?}"))
                    })
                    .transpose()?,
                batch_size: env_parse("EMBED_BATCH_SIZE", 128)?,
                max_retries: env_parse("EMBED_MAX_RETRIES", 5)?,
                timeout_secs: env_parse("EMBED_TIMEOUT_SECS", 30)?,
            },
            rerank: RerankConfig {
                api_base: env_opt("RERANK_API_BASE"),
                model: env_str("RERANK_MODEL", "ms-marco-MiniLM-L-12-v2"),
                timeout_secs: env_parse("RERANK_TIMEOUT_SECS", 30)?,
            },
            web_search: WebSearchConfig {
                enabled: env_bool("ENABLE_WEB_SEARCH", true)?,
                api_base: env_opt("SEARCH_API_BASE"),
                max_results: env_parse("WEB_SEARCH_K", 3)?,
                timeout_secs: env_parse("SEARCH_TIMEOUT_SECS", 15)?,
            },
            generation: GenerationConfig {
                api_key: env_opt("OPENAI_API_KEY"),
                api_base: env_str("OPENAI_BASE_URL", "https://api.openai.com"),
                model: env_str("OPENAI_MODEL", "gpt-4o-mini"),
                timeout_secs: env_parse("GENERATION_TIMEOUT_SECS", 60)?,
            },
            queue: QueueConfig {
                workers: env_parse("WORKERS", workers_default)?,
                result_ttl_secs: env_parse("RESULT_TTL_SECS", 3600)?,
                session_history_max: env_parse("SESSION_HISTORY_MAX", 50)?,
            },
            watch: WatchConfig {
                enabled: env_bool("WATCH_DOCS", true)?,
                debounce_secs: env_parse("REINGEST_DEBOUNCE_SECS", 3.0)?,
            },
            server: ServerConfig {
                bind: env_str("BIND_ADDR", "127.0.0.1:8080"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.chunk_chars == 0 {
            bail!("CHUNK_CHARS must be > 0");
        }
        if self.chunking.overlap_chars >= self.chunking.chunk_chars {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_CHARS ({})",
                self.chunking.overlap_chars,
                self.chunking.chunk_chars
            );
        }
        if self.retrieval.top_k == 0 {
            bail!("TOP_K must be >= 1");
        }
        if self.queue.workers == 0 {
            bail!("WORKERS must be >= 1");
        }
        if self.queue.result_ttl_secs == 0 {
            bail!("RESULT_TTL_SECS must be > 0");
        }
        if self.watch.debounce_secs <= 0.0 {
            bail!("REINGEST_DEBOUNCE_SECS must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A fully-populated config for unit tests; providers all disabled.
    pub(crate) fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: PathBuf::from("./test.db"),
                collection: "faq".to_string(),
            },
            chunking: ChunkingConfig {
                chunk_chars: 1000,
                overlap_chars: 150,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                data_dir: PathBuf::from("./data"),
            },
            embedding: EmbeddingConfig {
                api_base: None,
                model: "test-embed".to_string(),
                dims: None,
                batch_size: 128,
                max_retries: 5,
                timeout_secs: 30,
            },
            rerank: RerankConfig {
                api_base: None,
                model: "test-rerank".to_string(),
                timeout_secs: 30,
            },
            web_search: WebSearchConfig {
                enabled: true,
                api_base: None,
                max_results: 3,
                timeout_secs: 15,
            },
            generation: GenerationConfig {
                api_key: None,
                api_base: "https://api.openai.com".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 60,
            },
            queue: QueueConfig {
                workers: 2,
                result_ttl_secs: 3600,
                session_history_max: 50,
            },
            watch: WatchConfig {
                enabled: false,
                debounce_secs: 3.0,
            },
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut config = test_config();
        config.chunking.overlap_chars = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_top_k_rejected() {
        let mut config = test_config();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = test_config();
        config.queue.workers = 0;
        assert!(config.validate().is_err());
    }
}
