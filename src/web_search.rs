//! Client for a JSON web-search endpoint.
//!
//! The endpoint is called with `q`, `num` and (when configured) `api_key`
//! query parameters. Result items are read from the first non-empty of
//! `results`, `data` or `organic_results`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::WebSearchConfig;

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct WebSearchClient {
    endpoint: Option<String>,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl WebSearchClient {
    pub fn new(endpoint: Option<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build search HTTP client")?;
        Ok(Self {
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            api_key,
            http,
        })
    }

    pub fn from_config(config: &WebSearchConfig) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            config.api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let Some(endpoint) = &self.endpoint else {
            bail!("no web search endpoint configured");
        };

        let mut params: Vec<(&str, String)> = vec![("q", query.to_string()), ("num", limit.to_string())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let response = self
            .http
            .get(endpoint)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("Search request to {} failed", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Search endpoint returned {}: {}", status, body);
        }

        let payload: Value = response
            .json()
            .await
            .context("Search endpoint returned invalid JSON")?;
        Ok(parse_results(&payload, limit))
    }
}

/// Normalize a search payload into at most `limit` results.
pub fn parse_results(payload: &Value, limit: usize) -> Vec<SearchResult> {
    let items = ["results", "data", "organic_results"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_array))
        .find(|items| !items.is_empty());

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .take(limit)
        .map(|item| SearchResult {
            title: first_str(item, &["title", "name"]).unwrap_or("result").to_string(),
            url: first_str(item, &["url", "link"]).unwrap_or_default().to_string(),
            snippet: first_str(item, &["snippet", "description"])
                .unwrap_or_default()
                .to_string(),
        })
        .collect()
}

fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_results_field_fallbacks() {
        let payload = json!({
            "results": [],
            "organic_results": [
                { "name": "Pad", "link": "https://a", "description": "otp" },
                { "title": "", "url": "https://b" },
                { "title": "Third" }
            ]
        });
        let results = parse_results(&payload, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Pad");
        assert_eq!(results[0].url, "https://a");
        assert_eq!(results[0].snippet, "otp");
        assert_eq!(results[1].title, "result");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_results_non_object() {
        assert!(parse_results(&json!([1, 2]), 3).is_empty());
        assert!(parse_results(&json!({ "data": "nope" }), 3).is_empty());
    }

    #[tokio::test]
    async fn test_search_without_endpoint_fails() {
        let client = WebSearchClient::new(None, None, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
        let err = client.search("otp", 3).await.unwrap_err();
        assert!(err.to_string().contains("no web search endpoint"));
    }
}
