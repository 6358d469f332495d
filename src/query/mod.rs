// Query module
// Answers free-text questions against the active collection

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::embeddings::EmbeddingClient;
use crate::indexer::IndexManager;
use crate::store::RecordMetadata;
use crate::{MemoryError, Result};

pub const DEFAULT_K: usize = 5;

/// One ranked passage returned for a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

#[derive(Debug)]
pub struct QueryEngine {
    index: Arc<IndexManager>,
    embedder: EmbeddingClient,
    default_k: usize,
}

impl QueryEngine {
    #[inline]
    pub fn new(index: Arc<IndexManager>, embedder: EmbeddingClient) -> Self {
        Self {
            index,
            embedder,
            default_k: DEFAULT_K,
        }
    }

    #[inline]
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    /// The `k` passages most similar to `query_text`, best first
    ///
    /// `k` falls back to the engine's default when not given.
    #[inline]
    pub async fn answer(&self, query_text: &str, k: Option<usize>) -> Result<Vec<QueryAnswer>> {
        let query_text = query_text.trim();
        if query_text.is_empty() {
            return Err(MemoryError::InvalidQuery(
                "query text cannot be empty".to_string(),
            ));
        }

        let k = k.unwrap_or(self.default_k);
        if k == 0 {
            return Err(MemoryError::InvalidQuery(
                "k must be at least 1".to_string(),
            ));
        }

        let collection = self.index.current().await?;
        let vector = self
            .embedder
            .embed(query_text, Some(collection.dimension()))
            .await?;

        let answers: Vec<QueryAnswer> = collection
            .search(&vector, k)?
            .into_iter()
            .map(|result| QueryAnswer {
                chunk_id: result.record.chunk_id,
                text: result.record.text,
                score: result.score,
                metadata: result.record.metadata,
            })
            .collect();

        debug!(
            "Query {:?} returned {} results from generation {}",
            query_text,
            answers.len(),
            collection.generation()
        );
        Ok(answers)
    }
}
