//! Catalog search delegated to a hosted search service.
//!
//! The service answers with a generated summary plus ranked documents. Result
//! documents come in two flavours: website-style hits with `derivedStructData`
//! (title, link, snippets, page images) and structured catalog entries with
//! `structData`. Both are folded into [`SearchHit`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::task;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: usize = 10;
const SUMMARY_RESULT_COUNT: usize = 5;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search endpoint is not configured")]
    NotConfigured,
    #[error("search endpoint returned HTTP {0}")]
    Status(u16),
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("could not decode search response: {0}")]
    Decode(#[from] std::io::Error),
    #[error("search worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(rename = "posterUrl", default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    pub summary: String,
    pub results: Vec<SearchHit>,
    #[serde(rename = "rawResponse", default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchOutput, SearchError>;
}

#[derive(Clone)]
pub struct SearchClient {
    agent: ureq::Agent,
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl SearchClient {
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            endpoint,
            api_key,
        }
    }

    fn search_blocking(&self, query: &str) -> Result<SearchOutput, SearchError> {
        let endpoint = self.endpoint.as_deref().ok_or(SearchError::NotConfigured)?;
        let body = json!({
            "query": query,
            "pageSize": PAGE_SIZE,
            "contentSearchSpec": {
                "snippetSpec": { "returnSnippet": true },
                "summarySpec": {
                    "summaryResultCount": SUMMARY_RESULT_COUNT,
                    "ignoreAdversarialQuery": true,
                },
            },
        });

        let mut call = self.agent.post(endpoint);
        if let Some(key) = &self.api_key {
            call = call.set("Authorization", &format!("Bearer {key}"));
        }
        let response = call.send_json(body).map_err(|err| match err {
            ureq::Error::Status(code, _) => SearchError::Status(code),
            other => SearchError::Transport(other.to_string()),
        })?;

        let raw: Value = response.into_json()?;
        Ok(output_from_raw(raw))
    }
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn search(&self, query: &str) -> Result<SearchOutput, SearchError> {
        let client = self.clone();
        let query = query.to_owned();
        task::spawn_blocking(move || client.search_blocking(&query))
            .await
            .map_err(|err| SearchError::Worker(err.to_string()))?
    }
}

fn output_from_raw(raw: Value) -> SearchOutput {
    let summary = raw
        .pointer("/summary/summaryText")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let results = raw
        .get("results")
        .and_then(Value::as_array)
        .map(|results| results.iter().filter_map(hit_from_result).collect())
        .unwrap_or_default();

    SearchOutput {
        summary,
        results,
        raw_response: Some(raw),
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

fn hit_from_result(result: &Value) -> Option<SearchHit> {
    let document = result.get("document")?;

    if let Some(derived) = document.get("derivedStructData") {
        let url = str_at(derived, "/link")?;
        return Some(SearchHit {
            title: str_at(derived, "/title").unwrap_or(url).to_owned(),
            url: url.to_owned(),
            snippet: str_at(derived, "/snippets/0/snippet").map(str::to_owned),
            poster_url: str_at(derived, "/pagemap/cse_image/0/src")
                .or_else(|| str_at(derived, "/pagemap/cse_thumbnail/0/src"))
                .map(str::to_owned),
        });
    }

    let data = document.get("structData")?;
    let url = str_at(data, "/public_url")
        .or_else(|| str_at(data, "/url"))
        .or_else(|| str_at(data, "/uri"))?;
    Some(SearchHit {
        title: str_at(data, "/file_name")
            .or_else(|| str_at(data, "/title"))
            .unwrap_or(url)
            .to_owned(),
        url: url.to_owned(),
        snippet: str_at(data, "/summary/summary")
            .or_else(|| str_at(data, "/description"))
            .map(str::to_owned),
        poster_url: str_at(data, "/poster_url").map(str::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn website_results_map_to_hits() {
        let raw = json!({
            "summary": {"summaryText": "Two heist films match."},
            "results": [
                {"document": {"derivedStructData": {
                    "title": "Night Train",
                    "link": "https://films.example/night-train",
                    "snippets": [{"snippet": "A heist on rails"}],
                    "pagemap": {"cse_image": [{"src": "https://img.example/nt.jpg"}]}
                }}},
                {"document": {"derivedStructData": {"title": "No link"}}}
            ]
        });
        let output = output_from_raw(raw);
        assert_eq!(output.summary, "Two heist films match.");
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].snippet.as_deref(), Some("A heist on rails"));
        assert_eq!(
            output.results[0].poster_url.as_deref(),
            Some("https://img.example/nt.jpg")
        );
        assert!(output.raw_response.is_some());
    }

    #[test]
    fn structured_results_use_catalog_fields() {
        let raw = json!({
            "results": [
                {"document": {"structData": {
                    "file_name": "Match Day",
                    "public_url": "https://cdn.example/match.mp4",
                    "poster_url": "https://img.example/match.jpg",
                    "summary": {"summary": "Extended highlights"}
                }}}
            ]
        });
        let output = output_from_raw(raw);
        assert_eq!(output.summary, "");
        assert_eq!(
            output.results,
            vec![SearchHit {
                title: "Match Day".into(),
                url: "https://cdn.example/match.mp4".into(),
                snippet: Some("Extended highlights".into()),
                poster_url: Some("https://img.example/match.jpg".into()),
            }]
        );
    }

    #[test]
    fn output_serializes_with_camel_case_fields() {
        let output = SearchOutput {
            summary: "s".into(),
            results: vec![SearchHit {
                title: "t".into(),
                url: "u".into(),
                snippet: None,
                poster_url: Some("p".into()),
            }],
            raw_response: None,
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["results"][0]["posterUrl"], "p");
        assert!(value.get("rawResponse").is_none());
    }
}
