//! Request coordinator: runs one generation call and fans its increments out
//! through the [`Relay`].

use crate::config::ConfigSource;
use crate::decoder::NdjsonDecoder;
use crate::error::GenerateError;
use crate::ollama::OllamaClient;
use crate::prompts;
use crate::relay::{Increment, Relay, RequestId};
use futures_core::Stream;
use reqwest::Url;
use std::sync::Arc;
use tokio_stream::StreamExt;

/// Used when nothing is pinned and the server lists no models; the server's
/// 404 then tells the user to install it.
pub const FALLBACK_MODEL: &str = "llama3.2:latest";

/// Server and model for one call. Fixed once the call starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub base_url: Url,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Pending,
    Streaming,
    Completed,
    Failed,
}

/// One in-flight generation. Lives on the stack of [`Coordinator::generate`].
#[derive(Debug)]
struct Request<'a> {
    id: &'a RequestId,
    state: StreamState,
    accumulated: String,
    increments: usize,
}

impl<'a> Request<'a> {
    fn new(id: &'a RequestId) -> Self {
        Self {
            id,
            state: StreamState::Pending,
            accumulated: String::new(),
            increments: 0,
        }
    }

    fn transition(&mut self, next: StreamState) {
        tracing::debug!(request_id = %self.id, from = ?self.state, to = ?next, "request state");
        self.state = next;
    }
}

#[derive(Clone)]
pub struct Coordinator {
    http: reqwest::Client,
    config: Arc<dyn ConfigSource>,
    relay: Relay,
}

impl Coordinator {
    pub fn new(http: reqwest::Client, config: Arc<dyn ConfigSource>, relay: Relay) -> Self {
        Self {
            http,
            config,
            relay,
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Read settings once and settle on a server and model for one call.
    pub async fn resolve_model(&self) -> Result<(OllamaClient, ModelRef), GenerateError> {
        let settings = self
            .config
            .load()
            .map_err(|e| GenerateError::Config(format!("{e:#}")))?;

        let client = OllamaClient::new(self.http.clone(), settings.server_url_or_default())?;

        let model = match settings.selected_model.filter(|m| !m.trim().is_empty()) {
            Some(m) => m,
            None => match client.list_models().await?.into_iter().next() {
                Some(first) => {
                    tracing::debug!(model = %first.name, "no model pinned; using first available");
                    first.name
                }
                None => {
                    tracing::warn!(
                        fallback = FALLBACK_MODEL,
                        "server lists no models; trying fallback"
                    );
                    FALLBACK_MODEL.to_string()
                }
            },
        };

        let base_url = client.base_url().clone();
        Ok((client, ModelRef { base_url, model }))
    }

    /// Run one generation.
    ///
    /// Each increment is published under `request_id` as it arrives. On
    /// success the full text is returned; on failure nothing is, though
    /// increments already published stay published.
    pub async fn generate(
        &self,
        prompt: &str,
        context: &str,
        request_id: &RequestId,
    ) -> Result<String, GenerateError> {
        let mut request = Request::new(request_id);
        match self.run(&mut request, prompt, context).await {
            Ok(()) => {
                request.transition(StreamState::Completed);
                tracing::info!(
                    request_id = %request_id,
                    increments = request.increments,
                    bytes = request.accumulated.len(),
                    "generation complete"
                );
                Ok(request.accumulated)
            }
            Err(e) => {
                request.transition(StreamState::Failed);
                tracing::warn!(request_id = %request_id, error = %e, "generation failed");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &mut Request<'_>,
        prompt: &str,
        context: &str,
    ) -> Result<(), GenerateError> {
        let (client, model_ref) = self.resolve_model().await?;
        let full_prompt = prompts::frame_prompt(prompt, context);

        tracing::debug!(
            request_id = %request.id,
            server = %model_ref.base_url,
            model = %model_ref.model,
            "starting generation"
        );

        let resp = client.generate_stream(&model_ref.model, &full_prompt).await?;
        request.transition(StreamState::Streaming);
        self.consume(request, resp.bytes_stream()).await
    }

    async fn consume<S, B>(&self, request: &mut Request<'_>, body: S) -> Result<(), GenerateError>
    where
        S: Stream<Item = reqwest::Result<B>>,
        B: AsRef<[u8]>,
    {
        let mut body = std::pin::pin!(body);
        let mut decoder = NdjsonDecoder::new();

        while let Some(item) = body.next().await {
            let bytes = item.map_err(GenerateError::Interrupted)?;
            for text in decoder.push(bytes.as_ref())? {
                request.accumulated.push_str(&text);
                request.increments += 1;
                let delivered = self.relay.publish(&Increment {
                    request_id: request.id.clone(),
                    text,
                });
                tracing::trace!(request_id = %request.id, delivered, "published increment");
            }
        }

        decoder.finish();
        Ok(())
    }
}
