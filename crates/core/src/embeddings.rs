use crate::error::SearchError;
use crate::models::MergedChunk;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const OPENAI_EMBEDDING_DIMENSIONS: usize = 1536;
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;
}

/// Hosted embedding API (`/v1/embeddings`).
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: OPENAI_EMBEDDING_MODEL.to_string(),
            dimensions: OPENAI_EMBEDDING_DIMENSIONS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, chars = text.len(), "embedding request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "input": [text],
                "model": self.model,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "openai-embeddings".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: Value = response.json().await?;
        parse_embedding(&parsed)
    }
}

fn parse_embedding(payload: &Value) -> Result<Vec<f32>, SearchError> {
    payload
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|value| value as f32)
                .collect::<Vec<_>>()
        })
        .filter(|values| !values.is_empty())
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "openai-embeddings".to_string(),
            details: "missing data[0].embedding".to_string(),
        })
}

/// Deterministic hashing embedder for offline runs.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed_sync(text))
    }
}

/// Fills in the embedding of every chunk, one request at a time. Every vector
/// must have the embedder's declared dimensions.
pub async fn embed_chunks<E>(embedder: &E, chunks: &mut [MergedChunk]) -> Result<(), SearchError>
where
    E: Embedder + ?Sized,
{
    let total = chunks.len();
    let expected = embedder.dimensions();
    for (index, chunk) in chunks.iter_mut().enumerate() {
        let vector = embedder.embed(&chunk.text).await?;
        if vector.len() != expected {
            return Err(SearchError::Request(format!(
                "embedding dimension {} != {} for chunk {index}",
                vector.len(),
                expected
            )));
        }
        chunk.embedding = Some(vector);
        if (index + 1) % 50 == 0 || index + 1 == total {
            info!(embedded = index + 1, total, "embedding progress");
        }
    }
    Ok(())
}
