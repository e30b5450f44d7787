//! Ollama generate API provider

use crate::provider::{QueryBackend, QueryError, QueryResult};
use crate::types::{GenerateRequest, GenerateResponse, QueryRequest};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_VLM_MODEL: &str = "llava:7b";
pub const DEFAULT_LLM_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> QueryResult<Self> {
        Self::with_timeout(base_url, model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> QueryResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl QueryBackend for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn query(&self, request: QueryRequest) -> QueryResult<String> {
        let body = GenerateRequest::from_query(&self.model, request);
        debug!(
            model = %body.model,
            images = body.images.len(),
            "Ollama request"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Ollama error {}: {}", status, error_text);
            return Err(QueryError::RequestFailed {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: GenerateResponse = serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::InvalidResponse(e.to_string()))?;
        let text = parsed.response.trim().to_string();
        info!(model = %self.model, response = %text, "Ollama response");
        Ok(text)
    }
}
