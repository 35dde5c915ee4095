//! Generative model provider.
//!
//! [`Generator`] turns a fully-built prompt into a free-text answer.
//! [`HttpGenerator`] calls an OpenAI-compatible chat-completions endpoint.
//! The provider is optional: without an API key the worker returns the
//! retrieved passages with an explanatory note instead of a drafted answer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct HttpGenerator {
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpGenerator {
    /// Build from config; None when no API key is configured.
    pub fn from_config(config: &GenerationConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client,
        }))
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.api_base);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat completions API error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion_response(&json)
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("invalid chat completion response: missing content"))?;

    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_first_choice() {
        let json = serde_json::json!({
            "choices": [
                {"message": {"role": "assistant", "content": "  hello [1]  "}}
            ]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "hello [1]");
    }

    #[test]
    fn parse_rejects_empty_choices() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_completion_response(&json).is_err());
    }

    #[test]
    fn disabled_without_api_key() {
        let config = crate::config::tests::test_config().generation;
        assert!(HttpGenerator::from_config(&config).unwrap().is_none());
    }
}
