// Vector store module
// Collections of embedded chunks, their search index and on-disk format

pub mod collection;
pub mod persistence;
pub mod search;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::DocumentMetadata;
use crate::embeddings::Chunk;

pub use collection::Collection;
pub use persistence::{FORMAT_NAME, FORMAT_VERSION, IndexHeader};
pub use search::{FlatIndex, Neighbor, SearchIndex, is_finite};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Position of the chunk within its source
    pub ordinal: usize,
}

/// One embedded chunk as stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
    pub text: String,
}

impl IndexRecord {
    #[inline]
    pub fn from_chunk(chunk: Chunk, document: &DocumentMetadata, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            vector,
            metadata: RecordMetadata {
                source_id: chunk.source_id,
                file_name: document.file_name.clone(),
                timestamp: document.timestamp,
                ordinal: chunk.ordinal,
            },
            text: chunk.text,
        }
    }

    #[inline]
    pub fn source_id(&self) -> &str {
        &self.metadata.source_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub record: IndexRecord,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
}
