use crate::models::{VectorMatch, VectorRecord};
use crate::traits::VectorIndex;
use crate::SearchError;
use async_trait::async_trait;
use std::sync::RwLock;

/// In-process cosine-similarity index. Upserts replace records with the same id.
#[derive(Default)]
pub struct MemoryVectorStore {
    dimension: RwLock<Option<usize>>,
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<VectorRecord>) -> Self {
        Self {
            dimension: RwLock::new(records.first().map(|record| record.values.len())),
            records: RwLock::new(records),
        }
    }

    fn poisoned() -> SearchError {
        SearchError::NotReady("memory store lock poisoned".to_string())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let dot: f64 = left
        .iter()
        .zip(right.iter())
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum();
    let left_norm = left.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
    let right_norm = right.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

#[async_trait]
impl VectorIndex for MemoryVectorStore {
    async fn ensure_index(&self, dimension: usize) -> Result<bool, SearchError> {
        let mut configured = self.dimension.write().map_err(|_| Self::poisoned())?;
        match *configured {
            Some(existing) if existing != dimension => Err(SearchError::Request(format!(
                "configured vector size {existing} does not match requested {dimension}"
            ))),
            Some(_) => Ok(false),
            None => {
                *configured = Some(dimension);
                Ok(true)
            }
        }
    }

    async fn vector_count(&self) -> Result<u64, SearchError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.len() as u64)
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        let dimension = *self.dimension.read().map_err(|_| Self::poisoned())?;
        if let Some(expected) = dimension {
            if let Some(bad) = records.iter().find(|record| record.values.len() != expected) {
                return Err(SearchError::Request(format!(
                    "embedding dimension {} != {} for {}",
                    bad.values.len(),
                    expected,
                    bad.id
                )));
            }
        }

        let mut stored = self.records.write().map_err(|_| Self::poisoned())?;
        for record in records {
            match stored.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, SearchError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        let mut scored: Vec<VectorMatch> = records
            .iter()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorMetadata;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: VectorMetadata {
                text: id.to_string(),
                ..VectorMetadata::default()
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_similarity() -> Result<(), SearchError> {
        let store = MemoryVectorStore::new();
        assert!(store.ensure_index(2).await?);
        assert!(!store.ensure_index(2).await?);
        store
            .upsert(&[
                record("east", vec![1.0, 0.0]),
                record("north", vec![0.0, 1.0]),
                record("northeast", vec![1.0, 1.0]),
            ])
            .await?;

        let matches = store.query(&[0.9, 0.1], 2).await?;

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "east");
        assert_eq!(matches[1].id, "northeast");
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_and_checks_dimensions() -> Result<(), SearchError> {
        let store = MemoryVectorStore::new();
        store.ensure_index(2).await?;
        store.upsert(&[record("a", vec![1.0, 0.0])]).await?;
        store.upsert(&[record("a", vec![0.0, 1.0])]).await?;

        assert_eq!(store.vector_count().await?, 1);
        assert!(store.upsert(&[record("b", vec![1.0])]).await.is_err());
        assert!(store.ensure_index(3).await.is_err());
        Ok(())
    }

    #[test]
    fn zero_vectors_have_no_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
