use crate::models::{VectorMatch, VectorRecord};
use crate::SearchError;
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the index when missing. Returns `true` when it was created and
    /// `false` when it already existed.
    async fn ensure_index(&self, dimension: usize) -> Result<bool, SearchError>;

    async fn vector_count(&self) -> Result<u64, SearchError>;

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), SearchError>;

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, SearchError>;
}
