use anyhow::{Context, Result};
use async_trait::async_trait;
use grc_common::{OrganizationId, SearchConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::SkillExecutor;
use crate::skills::WEB_SEARCH;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default, alias = "content")]
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// `web_search`: generic JSON search API
#[derive(Debug, Clone)]
pub struct WebSearchSkill {
    endpoint: Option<String>,
    api_key: Option<String>,
    max_results: usize,
    client: Client,
}

impl WebSearchSkill {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint: config.endpoint.clone().filter(|e| !e.is_empty()),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            max_results: config.max_results,
            client,
        })
    }

    #[instrument(skip(self, api_key), fields(query_len = query.len()))]
    async fn search(&self, endpoint: &str, api_key: &str, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("q", query.to_string()), ("count", self.max_results.to_string())])
            .bearer_auth(api_key)
            .send()
            .await
            .context("Failed to send request to search provider")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Search provider returned error status {}: {}", status, error_text);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        let results: Vec<SearchResult> = parsed.results.into_iter().take(self.max_results).collect();
        debug!("Returning {} search results", results.len());
        Ok(results)
    }
}

#[async_trait]
impl SkillExecutor for WebSearchSkill {
    fn skill_id(&self) -> &'static str {
        WEB_SEARCH
    }

    async fn execute(&self, input: Value, _organization_id: OrganizationId) -> Result<Value> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .context("web_search requires a non-empty 'query'")?;

        let (Some(endpoint), Some(api_key)) = (&self.endpoint, &self.api_key) else {
            warn!("web_search called without a configured search provider");
            return Ok(json!({
                "query": query,
                "error": "Web search is not configured",
                "results": [],
            }));
        };

        match self.search(endpoint, api_key, query).await {
            Ok(results) => Ok(json!({ "query": query, "results": results })),
            Err(e) => {
                warn!("Web search failed: {:#}", e);
                Ok(json!({
                    "query": query,
                    "error": format!("Search failed: {}", e),
                    "results": [],
                }))
            }
        }
    }
}
