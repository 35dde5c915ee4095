//! Cross-encoder reranking provider.
//!
//! [`Reranker`] scores (query, passage) pairs with a higher-precision model
//! than the initial vector retrieval. [`HttpReranker`] speaks the common
//! `POST /v1/rerank` API shape (Jina/Cohere style): the response carries
//! `results[].{index, relevance_score}` and scores are mapped back to
//! passage order.
//!
//! The pipeline treats every failure here as non-fatal; see
//! [`crate::pipeline`] for the degradation rules.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::RerankConfig;

/// Scores each passage against the query. Returns one score per passage,
/// in passage order.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

pub struct HttpReranker {
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl HttpReranker {
    /// Build from config; None when no endpoint is configured.
    pub fn from_config(config: &RerankConfig) -> Result<Option<Self>> {
        let Some(api_base) = config.api_base.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        }))
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/rerank", self.api_base);
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": passages,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("rerank API error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        parse_rerank_response(&json, passages.len())
    }
}

/// Map `results[].{index, relevance_score}` back onto passage order.
/// Passages the provider omitted keep a score of 0.0.
fn parse_rerank_response(json: &serde_json::Value, n: usize) -> Result<Vec<f32>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("invalid rerank response: missing results array"))?;

    let mut scores = vec![0.0f32; n];
    for item in results {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| anyhow::anyhow!("invalid rerank response: missing index"))?
            as usize;
        if index >= n {
            bail!("invalid rerank response: index {index} out of range");
        }
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|s| s.as_f64())
            .unwrap_or(0.0) as f32;
        scores[index] = score;
    }

    Ok(scores)
}
