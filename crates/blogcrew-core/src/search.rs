//! Tools agents may call, and the Serper web search adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::{CrewError, SearchConfig, SecretValue, ToolSpec, error::error_chain};

/// An external capability an agent can invoke while working on a task.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Function name advertised to the model (`[A-Za-z0-9_-]+`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object.
    fn parameters(&self) -> Value;

    /// Run the tool. Errors propagate out of the agent loop unchanged.
    async fn call(&self, arguments: Value) -> Result<String, CrewError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

const SEARCH_TOOL_NAME: &str = "search_the_internet";
const SEARCH_TOOL_DESCRIPTION: &str =
    "Search the internet with a query and return the most relevant results.";

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Web search backed by the Serper (google.serper.dev) API.
pub struct SerperSearch {
    base_url: String,
    api_key: Option<SecretValue>,
    api_key_env: String,
    results: usize,
    http_client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(base_url: impl Into<String>, results: usize) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_key_env: "SERPER_API_KEY".to_string(),
            results,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, CrewError> {
        let mut search = Self::new(config.base_url.clone(), config.results);
        search.api_key = config.api_key.clone();
        search.api_key_env = config.api_key_env.clone();
        if let Some(timeout) = config.request_timeout {
            search = search.with_timeout(timeout)?;
        }
        Ok(search)
    }

    pub fn with_api_key(mut self, api_key: SecretValue) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, CrewError> {
        self.http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CrewError::InvalidConfiguration(format!("http client: {err}")))?;
        Ok(self)
    }

    fn fail(&self, reason: impl ToString) -> CrewError {
        CrewError::tool(SEARCH_TOOL_NAME, reason)
    }

    /// Query Serper and return the organic hits.
    #[instrument(name = "tool.search", skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CrewError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| CrewError::MissingSecret(self.api_key_env.clone()))?;

        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(url)
            .header("X-API-KEY", api_key.expose())
            .json(&SerperRequest {
                q: query,
                num: self.results,
            })
            .send()
            .await
            .map_err(|err| self.fail(error_chain(err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.fail(format!("HTTP {status}: {body}")));
        }

        let payload: SerperResponse = response
            .json()
            .await
            .map_err(|err| {
                self.fail(format!("undecodable response: {}", error_chain(err)))
            })?;

        let mut hits = payload.organic;
        hits.truncate(self.results);
        debug!(hits = hits.len(), "search completed");
        Ok(hits)
    }
}

/// Render hits the way they are handed back to the model.
pub(crate) fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No search results found.".to_string();
    }

    let blocks = hits
        .iter()
        .map(|hit| {
            format!(
                "Title: {}\nLink: {}\nSnippet: {}\n---",
                hit.title, hit.link, hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("\nSearch results: {blocks}\n")
}

#[async_trait]
impl Tool for SerperSearch {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        SEARCH_TOOL_DESCRIPTION
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_query": {
                    "type": "string",
                    "description": "Mandatory search query you want to use to search the internet"
                }
            },
            "required": ["search_query"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, CrewError> {
        let Some(query) = arguments
            .get("search_query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|query| !query.is_empty())
        else {
            return Ok("Error: `search_query` must be a non-empty string.".to_string());
        };

        let hits = self.search(query).await?;
        Ok(format_hits(&hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_render_as_blocks() {
        let hits = vec![
            SearchHit {
                title: "Quantum leap".into(),
                link: "https://example.com/q".into(),
                snippet: "Qubits scale".into(),
            },
            SearchHit {
                title: "Error correction".into(),
                link: "https://example.com/e".into(),
                snippet: String::new(),
            },
        ];

        let text = format_hits(&hits);
        assert!(text.contains("Title: Quantum leap\nLink: https://example.com/q\nSnippet: Qubits scale\n---"));
        assert!(text.contains("Title: Error correction"));
        assert_eq!(text.matches("---").count(), 2);
    }

    #[test]
    fn empty_hits_say_so() {
        assert_eq!(format_hits(&[]), "No search results found.");
    }

    #[test]
    fn spec_exposes_required_query() {
        let tool = SerperSearch::new("https://google.serper.dev", 5);
        let spec = tool.spec();
        assert_eq!(spec.name, "search_the_internet");
        assert_eq!(spec.parameters["required"][0], "search_query");
    }

    #[tokio::test]
    async fn blank_query_is_reported_back_to_the_model() {
        let tool = SerperSearch::new("http://127.0.0.1:9", 5)
            .with_api_key(SecretValue::new("key").unwrap());
        let reply = tool
            .call(json!({"search_query": "  "}))
            .await
            .expect("blank query should not hit the network");
        assert!(reply.starts_with("Error:"));
    }
}
