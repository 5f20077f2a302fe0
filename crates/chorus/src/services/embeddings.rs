use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingsConfig;

/// External embedding generator
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Serialize, Deserialize)]
struct EmbeddingRequest {
  texts: Vec<String>,
  id: String,
}

#[derive(Serialize, Deserialize)]
struct EmbeddingResponse {
  #[serde(default)]
  embeddings: Vec<Vec<f32>>,
  #[serde(default)]
  id: String,
  error: Option<String>,
}

/// Embedding service reached over HTTP with a JSON request/response pair
pub struct RemoteEmbeddingProvider {
  client: reqwest::Client,
  endpoint: String,
}

impl RemoteEmbeddingProvider {
  pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build embedding HTTP client")?;
    Ok(Self { client, endpoint: endpoint.into() })
  }

  /// `None` when no endpoint is configured
  pub fn from_config(config: &EmbeddingsConfig) -> Result<Option<Self>> {
    match &config.endpoint {
      Some(endpoint) => {
        Ok(Some(Self::new(endpoint.clone(), Duration::from_secs(config.timeout_secs))?))
      }
      None => Ok(None),
    }
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
  async fn embed(&self, text: &str) -> Result<Vec<f32>> {
    let request = EmbeddingRequest { texts: vec![text.to_string()], id: uuid::Uuid::new_v4().to_string() };

    let response = self
      .client
      .post(&self.endpoint)
      .json(&request)
      .send()
      .await
      .with_context(|| format!("Embedding request to {} failed", self.endpoint))?
      .error_for_status()
      .context("Embedding service returned an error status")?;

    let body: EmbeddingResponse =
      response.json().await.context("Embedding service returned malformed JSON")?;

    if let Some(error) = body.error {
      return Err(anyhow!("Embedding service error: {}", error));
    }

    if body.id != request.id {
      bentley::warn!(&format!(
        "Embedding response id {} does not match request id {}",
        body.id, request.id
      ));
    }

    body.embeddings.into_iter().next().ok_or_else(|| anyhow!("Embedding service returned no embeddings"))
  }
}
