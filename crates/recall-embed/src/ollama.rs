//! HTTP client for an Ollama-style `/api/embeddings` endpoint.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use recall_core::config::IndexSettings;
use recall_core::error::EmbedError;
use recall_core::traits::EmbedProvider;

#[derive(Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    id: String,
}

impl OllamaEmbedder {
    /// Build a client with a fixed per-request timeout.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = endpoint.into();
        let model = model.into();
        anyhow::ensure!(!endpoint.trim().is_empty(), "missing embedding endpoint");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build embedding HTTP client")?;
        let id = format!("ollama:{model}");
        Ok(Self { client, endpoint, model, id })
    }

    pub fn from_settings(settings: &IndexSettings) -> anyhow::Result<Self> {
        Self::new(&settings.embed_url, &settings.embed_model, settings.embed_timeout())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbedProvider for OllamaEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let request = EmbeddingRequest { model: &self.model, prompt: text };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Status { status: status.as_u16(), body });
        }

        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                EmbedError::Unreachable(e.to_string())
            } else {
                EmbedError::Malformed(e.to_string())
            }
        })?;
        if parsed.embedding.is_empty() {
            return Err(EmbedError::Malformed("response contained no embedding".into()));
        }
        Ok(parsed.embedding)
    }
}

fn classify_send_error(err: reqwest::Error) -> EmbedError {
    if err.is_connect() || err.is_timeout() {
        EmbedError::Unreachable(err.to_string())
    } else {
        EmbedError::Transport(err.to_string())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
