use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SearchProvider, SearchRequest, SearchResult};
use crate::error::{extract_error_message, SearchError};

pub const EXA_BASE_URL: &str = "https://api.exa.ai";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    contents: ExaContents,
}

#[derive(Serialize)]
struct ExaContents {
    text: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    title: Option<String>,
    url: String,
    text: Option<String>,
    author: Option<String>,
    published_date: Option<String>,
    favicon: Option<String>,
}

#[derive(Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

impl From<ExaResult> for SearchResult {
    fn from(r: ExaResult) -> Self {
        Self {
            title: r.title.unwrap_or_default(),
            url: r.url,
            text: r.text.unwrap_or_default(),
            author: r.author,
            published_date: r.published_date,
            favicon: r.favicon,
        }
    }
}

/// Direct client for the Exa search API.
#[derive(Clone)]
pub struct ExaSearchClient {
    client: Client,
    api_key: String,
    base_url: String,
    num_results: usize,
}

impl ExaSearchClient {
    pub fn new(api_key: &str, num_results: usize) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: EXA_BASE_URL.to_string(),
            num_results,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchProvider for ExaSearchClient {
    fn name(&self) -> &str {
        "exa"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        let url = format!("{}/search", self.base_url);
        debug!(query = %request.query, num_results = self.num_results, "searching exa");

        let body = ExaRequest {
            query: &request.query,
            num_results: self.num_results,
            contents: ExaContents { text: true },
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status,
                message: extract_error_message(&text),
            });
        }

        let exa: ExaResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        Ok(exa.results.into_iter().map(SearchResult::from).collect())
    }
}
