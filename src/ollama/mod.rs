//! Thin client for the local model server's HTTP API.

mod types;

pub use types::ModelInfo;

use crate::error::GenerateError;
use reqwest::Url;
use types::{GenerateRequest, TagsResponse};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: Url,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, GenerateError> {
        // `Url::join` replaces the last path segment unless the base ends in '/'.
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| GenerateError::Config(format!("invalid server URL {base_url:?}: {e}")))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, GenerateError> {
        self.base_url
            .join(path)
            .map_err(|e| GenerateError::Config(format!("invalid server URL: {e}")))
    }

    fn connection_error(&self, source: reqwest::Error) -> GenerateError {
        GenerateError::Connection {
            url: self.base_url.as_str().trim_end_matches('/').to_string(),
            source,
        }
    }

    /// `POST /api/generate` with streaming on. Returns the response once a
    /// 2xx status arrives; the body has not been read yet.
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<reqwest::Response, GenerateError> {
        let url = self.endpoint("api/generate")?;
        let body = GenerateRequest {
            model,
            prompt,
            stream: true,
        };

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(%status, model, body = %text, "generate request rejected");
            return Err(GenerateError::from_status(status, text, model));
        }

        Ok(resp)
    }

    /// `GET /api/tags`.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, GenerateError> {
        let url = self.endpoint("api/tags")?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(%status, body = %text, "model listing rejected");
            return Err(GenerateError::from_listing_status(status, text));
        }

        let tags: TagsResponse = resp.json().await.map_err(|e| GenerateError::Server {
            status: status.as_u16(),
            body: format!("invalid model list: {e}"),
        })?;
        Ok(tags.models)
    }
}
