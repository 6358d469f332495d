// Embeddings module
// Chunking of source text and the boundary to the embedding provider

pub mod chunking;
pub mod ollama;
pub mod stub;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::store::is_finite;
use crate::{MemoryError, Result};

pub use chunking::{Chunk, ChunkingConfig, chunk_document, chunk_id, split_text};
pub use ollama::OllamaClient;
pub use stub::HashEmbedder;

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can turn text into vectors
///
/// Implementations report an unreachable backend as [`MemoryError::EmbeddingUnavailable`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Embed several texts, returning one vector per text in the same order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Guards calls into an [`EmbeddingProvider`] with a timeout and shape checks
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for EmbeddingClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EmbeddingClient {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed a batch, failing with `EmbeddingUnavailable` on timeout or a short answer
    ///
    /// Vector lengths are not checked here; callers decide per item what a mismatch means.
    #[inline]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts with {}",
            texts.len(),
            self.provider.name()
        );

        let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(texts))
            .await
            .map_err(|_| {
                warn!(
                    "{} did not answer within {:?}",
                    self.provider.name(),
                    self.timeout
                );
                MemoryError::EmbeddingUnavailable(format!(
                    "{} timed out after {:?}",
                    self.provider.name(),
                    self.timeout
                ))
            })??;

        if vectors.len() != texts.len() {
            return Err(MemoryError::EmbeddingUnavailable(format!(
                "{} returned {} embeddings for {} texts",
                self.provider.name(),
                vectors.len(),
                texts.len()
            )));
        }

        Ok(vectors)
    }

    /// Embed one text and check it against the expected dimensionality, if known
    ///
    /// A vector with NaN or infinite components is reported as `EmbeddingUnavailable`.
    #[inline]
    pub async fn embed(&self, text: &str, expected_dimension: Option<usize>) -> Result<Vec<f32>> {
        let vector = self
            .embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                MemoryError::EmbeddingUnavailable(format!(
                    "{} returned no embedding",
                    self.provider.name()
                ))
            })?;

        if let Some(expected) = expected_dimension {
            check_dimension(&vector, expected)?;
        }

        if !is_finite(&vector) {
            return Err(MemoryError::EmbeddingUnavailable(format!(
                "{} returned NaN or infinite components",
                self.provider.name()
            )));
        }

        Ok(vector)
    }
}

/// Fail with `EmbeddingDimensionMismatch` unless `vector` has `expected` components
#[inline]
pub fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(MemoryError::EmbeddingDimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}
