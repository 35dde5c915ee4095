//! Web-search provider and raw-payload normalization.
//!
//! Search providers are wildly inconsistent about their payload shape: a
//! bare string, a JSON-encoded string, a list of strings, a list of objects
//! with varying key names, or an envelope object with a `results`/`data`
//! array. [`normalize_results`] folds all of those into a uniform
//! [`WebResult`] list; truly unparseable text degrades to a single
//! synthetic result rather than an error.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::WebSearchConfig;
use crate::models::WebResult;

/// Fetches raw search results for a query. The payload is returned
/// unnormalized so the parse rules live in one place.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str) -> Result<Value>;
}

/// HTTP search client: `GET {base}/search?q=...&max_results=N`.
pub struct HttpWebSearcher {
    api_base: String,
    max_results: usize,
    client: reqwest::Client,
}

impl HttpWebSearcher {
    /// Build from config; None when disabled or no endpoint is configured.
    pub fn from_config(config: &WebSearchConfig) -> Result<Option<Self>> {
        let Some(api_base) = config.api_base.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            client,
        }))
    }
}

#[async_trait]
impl WebSearcher for HttpWebSearcher {
    async fn search(&self, query: &str) -> Result<Value> {
        let url = format!("{}/search", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("max_results", &self.max_results.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("web search API error {status}: {body_text}");
        }

        // Some providers return text/plain JSON; parse from the raw body so
        // both cases land in the same normalization path.
        let body = response.text().await?;
        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(body)),
        }
    }
}

/// Why a raw payload could not be interpreted as a result list.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// A string payload that is not valid JSON.
    NotJson,
    /// A JSON shape with no recognizable result list.
    UnrecognizedShape,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::NotJson => write!(f, "payload is not valid JSON"),
            ParseError::UnrecognizedShape => write!(f, "no recognizable result list in payload"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Normalize a raw provider payload into at most `max_results` entries.
///
/// Unparseable payloads never error out of the pipeline: a non-JSON string
/// becomes one synthetic result carrying the raw text as its snippet, and
/// any other unrecognizable shape yields an empty list.
pub fn normalize_results(raw: &Value, max_results: usize) -> Vec<WebResult> {
    match parse_raw(raw) {
        Ok(mut results) => {
            results.truncate(max_results);
            results
        }
        Err(ParseError::NotJson) => vec![WebResult {
            title: "Web Search Result".to_string(),
            snippet: raw.as_str().unwrap_or_default().to_string(),
            url: None,
        }],
        Err(ParseError::UnrecognizedShape) => Vec::new(),
    }
}

/// Strict parse of the tagged union of known payload shapes.
pub fn parse_raw(raw: &Value) -> Result<Vec<WebResult>, ParseError> {
    match raw {
        Value::Null => Ok(Vec::new()),
        // A string is either JSON text (parse and recurse) or plain prose.
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner) => parse_raw(&inner),
            Err(_) => Err(ParseError::NotJson),
        },
        Value::Array(items) => Ok(items.iter().filter_map(parse_item).collect()),
        Value::Object(map) => {
            let list = map.get("results").or_else(|| map.get("data"));
            match list {
                Some(Value::Array(items)) => Ok(items.iter().filter_map(parse_item).collect()),
                Some(_) | None => Err(ParseError::UnrecognizedShape),
            }
        }
        _ => Err(ParseError::UnrecognizedShape),
    }
}

fn parse_item(item: &Value) -> Option<WebResult> {
    match item {
        Value::String(s) => Some(WebResult {
            title: "Result".to_string(),
            snippet: s.clone(),
            url: None,
        }),
        Value::Object(map) => {
            let str_of = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
                    .map(|s| s.to_string())
            };
            Some(WebResult {
                title: str_of(&["title", "name"]).unwrap_or_else(|| "Result".to_string()),
                snippet: str_of(&["snippet", "body", "description"]).unwrap_or_default(),
                url: str_of(&["link", "href", "url", "source"]),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_yields_empty() {
        assert!(normalize_results(&Value::Null, 3).is_empty());
    }

    #[test]
    fn list_of_objects() {
        let raw = json!([
            {"title": "A", "snippet": "alpha", "link": "https://a.example"},
            {"name": "B", "body": "beta", "href": "https://b.example"},
        ]);
        let results = normalize_results(&raw, 3);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "A");
        assert_eq!(results[0].url.as_deref(), Some("https://a.example"));
        assert_eq!(results[1].title, "B");
        assert_eq!(results[1].snippet, "beta");
    }

    #[test]
    fn list_of_strings() {
        let raw = json!(["first hit", "second hit"]);
        let results = normalize_results(&raw, 3);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Result");
        assert_eq!(results[0].snippet, "first hit");
        assert!(results[0].url.is_none());
    }

    #[test]
    fn json_encoded_string_is_unwrapped() {
        let raw = Value::String(r#"[{"title":"T","snippet":"s","url":"https://t"}]"#.to_string());
        let results = normalize_results(&raw, 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "T");
    }

    #[test]
    fn plain_text_degrades_to_synthetic_result() {
        let raw = Value::String("no structure here at all".to_string());
        let results = normalize_results(&raw, 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Web Search Result");
        assert_eq!(results[0].snippet, "no structure here at all");
        assert!(results[0].url.is_none());
    }

    #[test]
    fn envelope_object_results_key() {
        let raw = json!({"results": [{"title": "X", "description": "d"}]});
        let results = normalize_results(&raw, 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "d");
    }

    #[test]
    fn envelope_object_data_key() {
        let raw = json!({"data": ["only"]});
        let results = normalize_results(&raw, 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "only");
    }

    #[test]
    fn envelope_without_list_yields_empty() {
        let raw = json!({"status": "ok"});
        assert!(normalize_results(&raw, 3).is_empty());
        assert_eq!(parse_raw(&raw), Err(ParseError::UnrecognizedShape));
    }

    #[test]
    fn truncates_to_cap() {
        let raw = json!(["a", "b", "c", "d", "e"]);
        assert_eq!(normalize_results(&raw, 3).len(), 3);
    }

    #[test]
    fn non_string_non_object_items_skipped() {
        let raw = json!([42, {"title": "ok", "snippet": "s"}, true]);
        let results = normalize_results(&raw, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "ok");
    }
}
