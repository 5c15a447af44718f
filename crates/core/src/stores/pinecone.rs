use crate::models::{VectorMatch, VectorMetadata, VectorRecord};
use crate::traits::VectorIndex;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::Mutex;
use tracing::{debug, info};
use url::Url;

pub const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";
pub const PINECONE_API_VERSION: &str = "2024-07";
pub const DEFAULT_INDEX_NAME: &str = "dnd-embeddings";

/// Hosted vector index speaking the Pinecone REST API.
pub struct PineconeStore {
    client: Client,
    api_key: String,
    index_name: String,
    control_url: Url,
    cloud: String,
    region: String,
    host: Mutex<Option<Url>>,
}

impl PineconeStore {
    pub fn new(api_key: impl Into<String>, index_name: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::new(),
            api_key: api_key.into(),
            index_name: index_name.into(),
            control_url: Url::parse(PINECONE_CONTROL_URL)?,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            host: Mutex::new(None),
        })
    }

    /// Uses a known data-plane host instead of resolving it from the index description.
    pub fn with_host(self, host: &str) -> Result<Self, SearchError> {
        let parsed = parse_host(host)?;
        if let Ok(mut guard) = self.host.lock() {
            *guard = Some(parsed);
        }
        Ok(self)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }

    fn cached_host(&self) -> Option<Url> {
        self.host.lock().ok().and_then(|guard| guard.clone())
    }

    async fn data_url(&self, path: &str) -> Result<Url, SearchError> {
        let host = match self.cached_host() {
            Some(host) => host,
            None => {
                let resolved = self.describe_host().await?;
                if let Ok(mut guard) = self.host.lock() {
                    *guard = Some(resolved.clone());
                }
                resolved
            }
        };
        Ok(host.join(path)?)
    }

    async fn describe_host(&self) -> Result<Url, SearchError> {
        let url = self
            .control_url
            .join(&format!("indexes/{}", self.index_name))?;
        let response = self.authorized(self.client.get(url)).send().await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let description: Value = response.json().await?;
        let host = description
            .pointer("/host")
            .and_then(Value::as_str)
            .ok_or_else(|| SearchError::NotReady(format!("index {} has no host yet", self.index_name)))?;
        debug!(index = %self.index_name, host, "resolved index host");
        parse_host(host)
    }

    async fn post_data(&self, path: &str, body: Value) -> Result<Value, SearchError> {
        let url = self.data_url(path).await?;
        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        Ok(response.json().await?)
    }
}

fn parse_host(host: &str) -> Result<Url, SearchError> {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        Ok(Url::parse(&format!("{host}/"))?)
    } else {
        Ok(Url::parse(&format!("https://{host}/"))?)
    }
}

async fn backend_error(response: reqwest::Response) -> SearchError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    SearchError::BackendResponse {
        backend: "pinecone".to_string(),
        details: format!("{status}: {body}"),
    }
}

fn is_already_exists(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT || body.contains("ALREADY_EXISTS")
}

fn parse_vector_count(stats: &Value) -> Result<u64, SearchError> {
    stats
        .pointer("/totalVectorCount")
        .and_then(Value::as_u64)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "pinecone".to_string(),
            details: "describe_index_stats response missing totalVectorCount".to_string(),
        })
}

pub(crate) fn parse_matches(payload: &Value) -> Result<Vec<VectorMatch>, SearchError> {
    let matches = payload
        .pointer("/matches")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::with_capacity(matches.len());
    for hit in matches {
        let id = hit
            .pointer("/id")
            .and_then(Value::as_str)
            .unwrap_or("unknown-chunk")
            .to_string();
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        let metadata = match hit.get("metadata") {
            Some(metadata) if !metadata.is_null() => {
                serde_json::from_value::<VectorMetadata>(metadata.clone())?
            }
            _ => VectorMetadata::default(),
        };

        result.push(VectorMatch { id, score, metadata });
    }

    Ok(result)
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn ensure_index(&self, dimension: usize) -> Result<bool, SearchError> {
        let url = self.control_url.join("indexes")?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({
                "name": self.index_name,
                "dimension": dimension,
                "metric": "cosine",
                "spec": {
                    "serverless": {
                        "cloud": self.cloud,
                        "region": self.region,
                    }
                }
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(index = %self.index_name, dimension, "created index");
            return Ok(true);
        }

        let body = response.text().await.unwrap_or_default();
        if is_already_exists(status, &body) {
            info!("Index '{}' already exists.", self.index_name);
            return Ok(false);
        }

        Err(SearchError::BackendResponse {
            backend: "pinecone".to_string(),
            details: format!("{status}: {body}"),
        })
    }

    async fn vector_count(&self) -> Result<u64, SearchError> {
        let stats = self.post_data("describe_index_stats", json!({})).await?;
        parse_vector_count(&stats)
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let payload = self
            .post_data("vectors/upsert", json!({ "vectors": records }))
            .await?;
        let upserted = payload
            .pointer("/upsertedCount")
            .and_then(Value::as_u64)
            .unwrap_or(records.len() as u64);
        debug!(upserted, "pinecone upsert");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, SearchError> {
        let payload = self
            .post_data(
                "query",
                json!({
                    "vector": vector,
                    "topK": top_k,
                    "includeMetadata": true,
                }),
            )
            .await?;

        parse_matches(&payload)
    }
}
