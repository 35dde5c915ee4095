//! Multi-stage retrieval pipeline.
//!
//! Four stages run strictly in sequence over a shared [`RetrievalState`],
//! each merging its output into the state so later stages can read earlier
//! results:
//!
//! 1. **retrieve** — embed the question and pull nearest neighbors from the
//!    vector store, over-fetching at least [`CANDIDATE_FLOOR`] candidates so
//!    the reranker has material even for small `top_k`.
//! 2. **rerank** — score (question, passage) pairs with the cross-encoder
//!    and keep the best `top_k`.
//! 3. **web search** — optional, normalized to at most `web_search_k`
//!    entries.
//! 4. **combine** — documents in rank order, then web results; documents
//!    are always cited before web results.
//!
//! Every provider failure degrades the stage (empty or pass-through output,
//! logged) instead of aborting the run: given an unchanged index, a run is
//! deterministic up to provider-side nondeterminism.

use tracing::warn;

use crate::context::AppContext;
use crate::embedding::Embedder;
use crate::models::{ContextEntry, PassageMetadata, RetrievedPassage, WebResult};
use crate::rerank::Reranker;
use crate::store::VectorStore;
use crate::websearch::{self, WebSearcher};

/// Minimum number of retrieval candidates handed to the reranker.
const CANDIDATE_FLOOR: usize = 20;

/// Accumulated pipeline state; stages merge fields, never replace the whole.
#[derive(Debug, Default)]
pub struct RetrievalState {
    pub question: String,
    pub top_k: usize,
    pub use_web_search: bool,
    pub retriever_results: Vec<RetrievedPassage>,
    pub reranked_results: Vec<RetrievedPassage>,
    pub web_results: Vec<WebResult>,
    pub combined_contexts: Vec<ContextEntry>,
}

pub struct RetrievalPipeline<'a> {
    store: &'a VectorStore,
    embedder: Option<&'a dyn Embedder>,
    reranker: Option<&'a dyn Reranker>,
    web_searcher: Option<&'a dyn WebSearcher>,
    web_search_k: usize,
}

impl<'a> RetrievalPipeline<'a> {
    pub fn new(
        store: &'a VectorStore,
        embedder: Option<&'a dyn Embedder>,
        reranker: Option<&'a dyn Reranker>,
        web_searcher: Option<&'a dyn WebSearcher>,
        web_search_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            web_searcher,
            web_search_k,
        }
    }

    pub fn from_context(ctx: &'a AppContext) -> Self {
        Self::new(
            &ctx.store,
            ctx.embedder.as_deref(),
            ctx.reranker.as_deref(),
            ctx.web_searcher.as_deref(),
            ctx.config.web_search.max_results,
        )
    }

    /// Execute all four stages in order.
    pub async fn run(&self, question: &str, top_k: usize, use_web_search: bool) -> RetrievalState {
        let mut state = RetrievalState {
            question: question.trim().to_string(),
            top_k,
            use_web_search,
            ..Default::default()
        };

        self.retrieve(&mut state).await;
        self.rerank(&mut state).await;
        self.web_search(&mut state).await;
        self.combine(&mut state);

        state
    }

    /// Stage 1: embed the question and query the vector store.
    ///
    /// Fails soft: no embedder, embedding error, or store error all leave
    /// `retriever_results` empty.
    async fn retrieve(&self, state: &mut RetrievalState) {
        if state.question.is_empty() {
            return;
        }

        let Some(embedder) = self.embedder else {
            warn!("embedding provider unavailable; skipping retrieval");
            return;
        };

        let query_vec = match embedder.embed_one(&state.question).await {
            Ok(vec) => vec,
            Err(e) => {
                warn!("embedding failed: {e:#}");
                return;
            }
        };

        let candidate_k = CANDIDATE_FLOOR.max(state.top_k);
        let mut hits = match self.store.query(&query_vec, candidate_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("vector store query failed: {e:#}");
                return;
            }
        };

        for hit in &mut hits {
            if hit.metadata.source_type.is_none() {
                hit.metadata.source_type = Some("document".to_string());
            }
        }
        state.retriever_results = hits;
    }

    /// Stage 2: cross-encoder scoring.
    ///
    /// No reranker → first `top_k` in retrieval order, unscored. Scoring
    /// error → all scores 0.0, which the stable sort leaves in retrieval
    /// order. Ties always break by retrieval order.
    async fn rerank(&self, state: &mut RetrievalState) {
        if state.retriever_results.is_empty() || state.question.is_empty() {
            return;
        }

        let Some(reranker) = self.reranker else {
            warn!("reranker unavailable; returning retrieval order");
            state.reranked_results = state
                .retriever_results
                .iter()
                .take(state.top_k)
                .cloned()
                .collect();
            return;
        };

        let passages: Vec<String> = state
            .retriever_results
            .iter()
            .map(|r| r.document.clone())
            .collect();

        let scores = match reranker.score(&state.question, &passages).await {
            Ok(scores) if scores.len() == passages.len() => scores,
            Ok(scores) => {
                warn!(
                    "reranker returned {} scores for {} passages; ignoring",
                    scores.len(),
                    passages.len()
                );
                vec![0.0; passages.len()]
            }
            Err(e) => {
                warn!("reranker failed: {e:#}");
                vec![0.0; passages.len()]
            }
        };

        let mut scored: Vec<RetrievedPassage> = state
            .retriever_results
            .iter()
            .cloned()
            .zip(scores)
            .map(|(mut passage, score)| {
                passage.score = Some(score);
                passage
            })
            .collect();

        // Stable sort: equal scores keep retrieval order.
        scored.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(state.top_k);
        state.reranked_results = scored;
    }

    /// Stage 3: optional web search, normalized.
    async fn web_search(&self, state: &mut RetrievalState) {
        if !state.use_web_search || state.question.is_empty() {
            return;
        }
        let Some(searcher) = self.web_searcher else {
            return;
        };

        let raw = match searcher.search(&state.question).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("web search failed: {e:#}");
                return;
            }
        };

        state.web_results = websearch::normalize_results(&raw, self.web_search_k);
    }

    /// Stage 4: documents in rank order, then web results in provider
    /// order; web results with empty snippets are dropped.
    fn combine(&self, state: &mut RetrievalState) {
        let mut contexts: Vec<ContextEntry> = Vec::new();

        for passage in &state.reranked_results {
            contexts.push(ContextEntry {
                document: passage.document.clone(),
                metadata: passage.metadata.clone(),
                score: passage.score,
                citation_label: None,
            });
        }

        for result in &state.web_results {
            if result.snippet.is_empty() {
                continue;
            }
            let metadata = PassageMetadata {
                source: Some(
                    result
                        .url
                        .clone()
                        .unwrap_or_else(|| "web-search".to_string()),
                ),
                url: result.url.clone(),
                title: Some(if result.title.is_empty() {
                    result
                        .url
                        .clone()
                        .unwrap_or_else(|| "Web Result".to_string())
                } else {
                    result.title.clone()
                }),
                section_label: Some(result.snippet.clone()),
                source_type: Some("web".to_string()),
                ..Default::default()
            };
            contexts.push(ContextEntry {
                document: result.snippet.clone(),
                metadata,
                score: None,
                citation_label: None,
            });
        }

        state.combined_contexts = contexts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_id;
    use crate::models::IngestChunk;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    /// Deterministic unit-vector embedder: maps known phrases to axes.
    struct AxisEmbedder;

    fn axis_for(text: &str) -> Vec<f32> {
        if text.contains("mfa") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("ldap") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| axis_for(&t.to_lowercase())).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("model offline")
        }
    }

    /// Scores passages by a keyword hit, ties at 0.0.
    struct KeywordReranker {
        keyword: String,
    }

    #[async_trait]
    impl Reranker for KeywordReranker {
        async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>> {
            Ok(passages
                .iter()
                .map(|p| if p.contains(&self.keyword) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        async fn score(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>> {
            anyhow::bail!("cross-encoder offline")
        }
    }

    struct FixedWebSearcher {
        payload: serde_json::Value,
    }

    #[async_trait]
    impl WebSearcher for FixedWebSearcher {
        async fn search(&self, _query: &str) -> Result<serde_json::Value> {
            Ok(self.payload.clone())
        }
    }

    async fn seeded_store(docs: &[(&str, &str)]) -> (VectorStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::connect(&dir.path().join("pipeline.db"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let store = VectorStore::new(pool, "faq");

        let chunks: Vec<(IngestChunk, Vec<f32>)> = docs
            .iter()
            .enumerate()
            .map(|(i, (source, text))| {
                (
                    IngestChunk {
                        id: chunk_id(source, i),
                        text: text.to_string(),
                        metadata: crate::models::PassageMetadata {
                            source: Some(source.to_string()),
                            filename: Some(source.to_string()),
                            ..Default::default()
                        },
                    },
                    axis_for(&text.to_lowercase()),
                )
            })
            .collect();
        store.replace_collection(&chunks).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn retrieves_and_tags_documents() {
        let (store, _dir) = seeded_store(&[
            ("mfa.md", "Enable MFA enrollment in settings"),
            ("ldap.md", "Configure LDAP directory sync"),
        ])
        .await;

        let pipeline = RetrievalPipeline::new(&store, Some(&AxisEmbedder), None, None, 3);
        let state = pipeline.run("What is MFA enrollment?", 1, false).await;

        assert_eq!(state.retriever_results.len(), 2); // over-fetch floor
        assert_eq!(state.reranked_results.len(), 1);
        assert!(state.reranked_results[0].document.contains("MFA"));
        assert_eq!(
            state.reranked_results[0].metadata.source_type.as_deref(),
            Some("document")
        );
    }

    #[tokio::test]
    async fn embedding_failure_degrades_to_empty() {
        let (store, _dir) = seeded_store(&[("mfa.md", "Enable MFA")]).await;
        let pipeline = RetrievalPipeline::new(&store, Some(&FailingEmbedder), None, None, 3);
        let state = pipeline.run("anything", 3, false).await;
        assert!(state.retriever_results.is_empty());
        assert!(state.combined_contexts.is_empty());
    }

    #[tokio::test]
    async fn no_embedder_degrades_to_empty() {
        let (store, _dir) = seeded_store(&[("mfa.md", "Enable MFA")]).await;
        let pipeline = RetrievalPipeline::new(&store, None, None, None, 3);
        let state = pipeline.run("anything", 3, false).await;
        assert!(state.combined_contexts.is_empty());
    }

    #[tokio::test]
    async fn reranker_overrides_retrieval_order() {
        // Query lands on the MFA axis, but the reranker prefers the LDAP
        // passage; over-fetching lets it win despite a worse distance.
        let (store, _dir) = seeded_store(&[
            ("mfa.md", "Enable MFA enrollment"),
            ("ldap.md", "Configure LDAP directory"),
        ])
        .await;

        let reranker = KeywordReranker {
            keyword: "LDAP".to_string(),
        };
        let pipeline = RetrievalPipeline::new(&store, Some(&AxisEmbedder), Some(&reranker), None, 3);
        let state = pipeline.run("mfa question", 1, false).await;

        assert_eq!(state.reranked_results.len(), 1);
        assert!(state.reranked_results[0].document.contains("LDAP"));
        assert_eq!(state.reranked_results[0].score, Some(1.0));
    }

    #[tokio::test]
    async fn rerank_failure_keeps_retrieval_order() {
        let (store, _dir) = seeded_store(&[
            ("mfa.md", "Enable MFA enrollment"),
            ("ldap.md", "Configure LDAP directory"),
        ])
        .await;

        let pipeline =
            RetrievalPipeline::new(&store, Some(&AxisEmbedder), Some(&FailingReranker), None, 3);
        let state = pipeline.run("mfa question", 2, false).await;

        // All scores 0.0; stable sort keeps the distance ordering.
        assert_eq!(state.reranked_results.len(), 2);
        assert!(state.reranked_results[0].document.contains("MFA"));
        assert_eq!(state.reranked_results[0].score, Some(0.0));
    }

    #[tokio::test]
    async fn no_reranker_passes_through_top_k() {
        let (store, _dir) = seeded_store(&[
            ("mfa.md", "Enable MFA enrollment"),
            ("ldap.md", "Configure LDAP directory"),
        ])
        .await;

        let pipeline = RetrievalPipeline::new(&store, Some(&AxisEmbedder), None, None, 3);
        let state = pipeline.run("mfa question", 1, false).await;

        assert_eq!(state.reranked_results.len(), 1);
        assert!(state.reranked_results[0].document.contains("MFA"));
        assert!(state.reranked_results[0].score.is_none());
    }

    #[tokio::test]
    async fn documents_precede_web_results() {
        let (store, _dir) = seeded_store(&[("mfa.md", "Enable MFA enrollment")]).await;
        let searcher = FixedWebSearcher {
            payload: json!([
                {"title": "Blog", "snippet": "web take on MFA", "link": "https://blog.example"},
                {"title": "Empty", "snippet": "", "link": "https://empty.example"},
            ]),
        };

        let pipeline =
            RetrievalPipeline::new(&store, Some(&AxisEmbedder), None, Some(&searcher), 3);
        let state = pipeline.run("mfa", 3, true).await;

        assert_eq!(state.combined_contexts.len(), 2); // empty snippet dropped
        assert_eq!(
            state.combined_contexts[0].metadata.source_type.as_deref(),
            Some("document")
        );
        assert_eq!(
            state.combined_contexts[1].metadata.source_type.as_deref(),
            Some("web")
        );
        assert_eq!(
            state.combined_contexts[1].metadata.url.as_deref(),
            Some("https://blog.example")
        );
    }

    #[tokio::test]
    async fn web_search_disabled_by_request() {
        let (store, _dir) = seeded_store(&[("mfa.md", "Enable MFA enrollment")]).await;
        let searcher = FixedWebSearcher {
            payload: json!([{"title": "Blog", "snippet": "hit"}]),
        };

        let pipeline =
            RetrievalPipeline::new(&store, Some(&AxisEmbedder), None, Some(&searcher), 3);
        let state = pipeline.run("mfa", 3, false).await;

        assert!(state.web_results.is_empty());
        assert!(state
            .combined_contexts
            .iter()
            .all(|c| c.metadata.source_type.as_deref() == Some("document")));
    }

    #[tokio::test]
    async fn empty_question_produces_empty_state() {
        let (store, _dir) = seeded_store(&[("mfa.md", "Enable MFA enrollment")]).await;
        let pipeline = RetrievalPipeline::new(&store, Some(&AxisEmbedder), None, None, 3);
        let state = pipeline.run("   ", 3, true).await;
        assert!(state.retriever_results.is_empty());
        assert!(state.web_results.is_empty());
        assert!(state.combined_contexts.is_empty());
    }

    #[tokio::test]
    async fn repeated_runs_are_deterministic() {
        let (store, _dir) = seeded_store(&[
            ("mfa.md", "Enable MFA enrollment"),
            ("ldap.md", "Configure LDAP directory"),
            ("other.md", "Unrelated release notes"),
        ])
        .await;

        let pipeline = RetrievalPipeline::new(&store, Some(&AxisEmbedder), None, None, 3);
        let a = pipeline.run("mfa", 2, false).await;
        let b = pipeline.run("mfa", 2, false).await;

        let docs_a: Vec<&str> = a.combined_contexts.iter().map(|c| c.document.as_str()).collect();
        let docs_b: Vec<&str> = b.combined_contexts.iter().map(|c| c.document.as_str()).collect();
        assert_eq!(docs_a, docs_b);
    }
}
