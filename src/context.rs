//! Shared application context.
//!
//! One [`AppContext`] is constructed at startup and passed by reference into
//! the gateway, the workers, and the watcher — there is no global mutable
//! state. Providers keep the construct-or-null semantics: a provider that
//! cannot be configured is held as `None`, logged once here, and checked
//! before every use so the pipeline degrades instead of failing.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::{Embedder, HttpEmbedder};
use crate::llm::{Generator, HttpGenerator};
use crate::rerank::{HttpReranker, Reranker};
use crate::store::VectorStore;
use crate::websearch::{HttpWebSearcher, WebSearcher};
use crate::{db, migrate};

pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub store: VectorStore,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub web_searcher: Option<Arc<dyn WebSearcher>>,
    pub generator: Option<Arc<dyn Generator>>,
    /// Held for the duration of a re-ingest; serializes the watcher with
    /// any manually triggered rebuild.
    pub reingest_lock: Mutex<()>,
}

impl AppContext {
    /// Connect, migrate, and build all providers fail-soft.
    pub async fn init(config: Config) -> Result<Arc<Self>> {
        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;

        let store = VectorStore::new(pool.clone(), config.db.collection.clone());

        let embedder = build_provider("embedding", HttpEmbedder::from_config(&config.embedding));
        let reranker = build_provider("rerank", HttpReranker::from_config(&config.rerank));
        let web_searcher = if config.web_search.enabled {
            build_provider("web search", HttpWebSearcher::from_config(&config.web_search))
        } else {
            None
        };
        let generator = build_provider("generation", HttpGenerator::from_config(&config.generation));

        info!(
            db = %config.db.path.display(),
            collection = %config.db.collection,
            embedder = embedder.is_some(),
            reranker = reranker.is_some(),
            web_search = web_searcher.is_some(),
            generator = generator.is_some(),
            "context initialized"
        );

        Ok(Arc::new(Self {
            config,
            pool,
            store,
            embedder: embedder.map(|e| Arc::new(e) as Arc<dyn Embedder>),
            reranker: reranker.map(|r| Arc::new(r) as Arc<dyn Reranker>),
            web_searcher: web_searcher.map(|w| Arc::new(w) as Arc<dyn WebSearcher>),
            generator: generator.map(|g| Arc::new(g) as Arc<dyn Generator>),
            reingest_lock: Mutex::new(()),
        }))
    }
}

/// Unwrap a provider constructor fail-soft: configuration errors are logged
/// and the provider stays unset.
fn build_provider<T>(name: &str, result: Result<Option<T>>) -> Option<T> {
    match result {
        Ok(Some(provider)) => Some(provider),
        Ok(None) => {
            info!("{name} provider not configured");
            None
        }
        Err(e) => {
            warn!("unable to initialize {name} provider: {e:#}");
            None
        }
    }
}
