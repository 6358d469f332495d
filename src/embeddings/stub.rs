//! Deterministic in-process embedder.
//!
//! Each lower-cased word is hashed into one of `dimension` buckets with a sign,
//! and the bucket counts are L2-normalised. Texts that share words end up close
//! together, which is enough to exercise ranking without a model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::{MemoryError, Result};

#[derive(Debug)]
pub struct HashEmbedder {
    dimension: usize,
    fail_marker: Option<String>,
    wrong_dimension_marker: Option<String>,
    non_finite_marker: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl HashEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            fail_marker: None,
            wrong_dimension_marker: None,
            non_finite_marker: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report the provider as unavailable for any batch containing `marker`
    #[inline]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Return a vector one component too long for texts containing `marker`
    #[inline]
    pub fn wrong_dimension_on(mut self, marker: impl Into<String>) -> Self {
        self.wrong_dimension_marker = Some(marker.into());
        self
    }

    /// Put a NaN in the first component for texts containing `marker`
    #[inline]
    pub fn non_finite_on(mut self, marker: impl Into<String>) -> Self {
        self.non_finite_marker = Some(marker.into());
        self
    }

    /// Sleep before answering each batch
    #[inline]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of batches requested so far
    #[inline]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector this embedder produces for `text`
    #[inline]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) % self.dimension as u64;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket as usize] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash-stub"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(MemoryError::EmbeddingUnavailable(format!(
                    "hash-stub refused text containing {:?}",
                    marker
                )));
            }
        }

        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = self.vector_for(text);
                if let Some(marker) = &self.wrong_dimension_marker {
                    if text.contains(marker.as_str()) {
                        vector.push(0.0);
                    }
                }
                if let Some(marker) = &self.non_finite_marker {
                    if text.contains(marker.as_str()) {
                        if let Some(first) = vector.first_mut() {
                            *first = f32::NAN;
                        }
                    }
                }
                vector
            })
            .collect())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
