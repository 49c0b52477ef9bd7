//! HTTP client for the research backend
//!
//! Every call is a single request; retry and polling policy belong to the
//! session resolvers, which know when a failure is worth another attempt.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{BackendConfig, EndpointPaths};
use crate::error::{Error, Result};

use super::wire::{
    QueryRequest, ResearchRequest, ResearchResult, ResearchStarted, ResearchStatus,
    ThreadResponse,
};
use super::Backend;

/// reqwest-backed [`Backend`]
pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: String,
    endpoints: EndpointPaths,
}

impl BackendClient {
    /// Create a new backend client from configuration
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("backend.base_url is required".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn url_with_id(&self, path: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.url(path).trim_end_matches('/'),
            urlencoding::encode(id)
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(url = %url, "GET");
        let response = self.http_client.get(url).send().await?;
        Self::read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        tracing::debug!(url = %url, "POST");
        let response = self.http_client.post(url).json(body).send().await?;
        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn query(&self, content: &str, thread_id: Option<&str>) -> Result<ThreadResponse> {
        let url = self.url(&self.endpoints.query);
        let mut response: ThreadResponse = self
            .post_json(&url, &QueryRequest { content, thread_id })
            .await?;
        response.normalize_roles();
        tracing::debug!(
            thread_id = ?response.thread_id,
            messages = response.messages.len(),
            "Query accepted"
        );
        Ok(response)
    }

    async fn start_research(&self, query: &str, iteration_limit: u32) -> Result<ResearchStarted> {
        let url = self.url(&self.endpoints.research_start);
        let started: ResearchStarted = self
            .post_json(
                &url,
                &ResearchRequest {
                    query,
                    iteration_limit,
                },
            )
            .await?;
        tracing::info!(research_id = %started.research_id, "Research started");
        Ok(started)
    }

    async fn research_status(&self, job_id: &str) -> Result<ResearchStatus> {
        let url = self.url_with_id(&self.endpoints.research_status, job_id);
        self.get_json(&url).await
    }

    async fn research_result(&self, job_id: &str) -> Result<ResearchResult> {
        let url = self.url_with_id(&self.endpoints.research_result, job_id);
        self.get_json(&url).await
    }

    async fn thread(&self, thread_id: &str) -> Result<ThreadResponse> {
        let url = self.url_with_id(&self.endpoints.thread, thread_id);
        let mut thread: ThreadResponse = self.get_json(&url).await?;
        thread.normalize_roles();
        Ok(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_base_url() {
        let config = BackendConfig {
            base_url: "/".to_string(),
            ..Default::default()
        };
        assert!(BackendClient::new(&config).is_err());
    }

    #[test]
    fn test_urls_join_cleanly() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/api/query"), "http://localhost:8000/api/query");
        assert_eq!(
            client.url_with_id("/api/thread", "a b/c"),
            "http://localhost:8000/api/thread/a%20b%2Fc"
        );
    }
}
