use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{SearchProvider, SearchRequest, SearchResult};
use crate::error::{extract_error_message, SearchError};

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Search through an HTTP endpoint that fronts the real search provider.
#[derive(Clone)]
pub struct EndpointSearchClient {
    client: Client,
    endpoint: String,
}

impl EndpointSearchClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SearchProvider for EndpointSearchClient {
    fn name(&self) -> &str {
        "endpoint"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        debug!(endpoint = %self.endpoint, query = %request.query, "searching");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
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

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        Ok(body.results)
    }
}
