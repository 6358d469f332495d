// Indexer module
// Builds collections from documents and publishes them to readers


use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use indicatif::ProgressBar;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::documents::{Document, DocumentMetadata};
use crate::embeddings::{Chunk, ChunkingConfig, EmbeddingClient, chunk_document};
use crate::store::{Collection, IndexRecord, is_finite};
use crate::{MemoryError, Result};

/// How the index manager chunks, embeds and names a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub collection: String,
    /// Dimensionality a fresh collection is created with
    pub dimension: usize,
    pub chunking: ChunkingConfig,
    /// Texts per embedding request
    pub batch_size: usize,
    /// Embedding requests allowed in flight at once
    pub concurrency: usize,
}

impl IndexOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.index.collection.clone(),
            dimension: config.ollama.embedding_dimension as usize,
            chunking: config.chunking.clone(),
            batch_size: config.ollama.batch_size as usize,
            concurrency: config.index.embed_concurrency,
        }
    }
}

/// A chunk left out of the index because its embedding had the wrong shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChunk {
    pub chunk_id: String,
    pub source_id: String,
    pub reason: String,
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub records: usize,
    pub skipped: Vec<SkippedChunk>,
    /// Generation of the collection that was published
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub generation: u64,
    pub records: usize,
    pub sources: usize,
    pub dimension: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub collection: String,
    pub path: PathBuf,
    /// `None` until a collection has been built or loaded
    pub stats: Option<CollectionStats>,
}

/// Owns the active collection of one index file
///
/// Readers take a cheap snapshot with [`IndexManager::current`]. Writers
/// serialize, build a new collection on the side, persist it, and only then
/// swap it in, so a failed run leaves both the published collection and the
/// file on disk unchanged.
#[derive(Debug)]
pub struct IndexManager {
    options: IndexOptions,
    path: PathBuf,
    embedder: EmbeddingClient,
    active: RwLock<Option<Arc<Collection>>>,
    write_lock: Mutex<()>,
    progress: ProgressBar,
}

impl IndexManager {
    /// Open the index at `path`, loading it if the file exists
    ///
    /// A damaged file surfaces as `CorruptIndex` rather than an empty index.
    #[inline]
    pub async fn open(
        path: impl Into<PathBuf>,
        options: IndexOptions,
        embedder: EmbeddingClient,
    ) -> Result<Self> {
        let path = path.into();

        let active = if path.exists() {
            let load_path = path.clone();
            let collection: Collection =
                tokio::task::spawn_blocking(move || Collection::load(&load_path))
                    .await
                    .map_err(anyhow::Error::from)??;

            if collection.name() != options.collection {
                warn!(
                    "Index file {} holds collection {:?}, expected {:?}",
                    path.display(),
                    collection.name(),
                    options.collection
                );
            }
            if collection.dimension() != options.dimension {
                warn!(
                    "Collection {} has {} dimensions but {} are configured; keeping {}",
                    collection.name(),
                    collection.dimension(),
                    options.dimension,
                    collection.dimension()
                );
            }

            info!(
                "Opened collection {} ({} records, generation {})",
                collection.name(),
                collection.len(),
                collection.generation()
            );
            Some(Arc::new(collection))
        } else {
            debug!("No index at {}; starting empty", path.display());
            None
        };

        Ok(Self {
            options,
            path,
            embedder,
            active: RwLock::new(active),
            write_lock: Mutex::new(()),
            progress: ProgressBar::hidden(),
        })
    }

    /// Report embedding progress on `bar` during ingestion
    #[inline]
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// The most recently published collection
    #[inline]
    pub async fn current(&self) -> Result<Arc<Collection>> {
        self.try_current().await.ok_or_else(|| {
            MemoryError::IndexNotReady(format!(
                "collection {:?} has not been built yet",
                self.options.collection
            ))
        })
    }

    #[inline]
    pub async fn try_current(&self) -> Option<Arc<Collection>> {
        self.active.read().await.as_ref().map(Arc::clone)
    }

    #[inline]
    pub async fn status(&self) -> IndexStatus {
        let stats = self.try_current().await.map(|c| CollectionStats {
            generation: c.generation(),
            records: c.len(),
            sources: c.source_count(),
            dimension: c.dimension(),
        });

        IndexStatus {
            collection: self.options.collection.clone(),
            path: self.path.clone(),
            stats,
        }
    }

    /// Replace the whole collection with one built from `documents`
    #[inline]
    pub async fn rebuild_from(&self, documents: &[Document]) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().await;

        let previous_generation = self.try_current().await.map_or(0, |c| c.generation());
        let documents = latest_per_source(documents);
        let chunks = self.chunk_all(&documents);
        let chunk_count = chunks.len();

        info!(
            "Rebuilding {} from {} documents ({} chunks)",
            self.options.collection,
            documents.len(),
            chunk_count
        );

        let (records, skipped) = self.embed_chunks(chunks, self.options.dimension, true).await?;

        let mut collection = Collection::starting_at(
            self.options.collection.clone(),
            self.options.dimension,
            previous_generation,
        );
        let records_count = records.len();
        let generation = collection.upsert(records)?;
        self.publish(collection).await?;

        Ok(IngestReport {
            documents: documents.len(),
            chunks: chunk_count,
            records: records_count,
            skipped,
            generation,
        })
    }

    /// Replace the records of each given source, leaving other sources untouched
    #[inline]
    pub async fn ingest_incremental(&self, documents: &[Document]) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().await;

        let (mut working, establishing) = match self.try_current().await {
            Some(current) => (current.as_ref().clone(), false),
            None => (
                Collection::new(self.options.collection.clone(), self.options.dimension),
                true,
            ),
        };

        let documents = latest_per_source(documents);
        let chunks = self.chunk_all(&documents);
        let chunk_count = chunks.len();

        info!(
            "Ingesting {} documents ({} chunks) into {}",
            documents.len(),
            chunk_count,
            self.options.collection
        );

        let (records, skipped) = self
            .embed_chunks(chunks, working.dimension(), establishing)
            .await?;

        let sources: HashSet<String> = documents
            .iter()
            .map(|d| d.source_id().to_string())
            .collect();
        let records_count = records.len();
        let generation = working.replace_sources(&sources, records)?;
        self.publish(working).await?;

        Ok(IngestReport {
            documents: documents.len(),
            chunks: chunk_count,
            records: records_count,
            skipped,
            generation,
        })
    }

    /// Remove one source, returning how many records went with it
    #[inline]
    pub async fn delete_source(&self, source_id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut working = self.current().await?.as_ref().clone();
        let removed = working.delete(source_id);
        if removed == 0 {
            debug!("Source {} not present; nothing to delete", source_id);
            return Ok(0);
        }

        self.publish(working).await?;
        info!("Deleted {} records of {}", removed, source_id);
        Ok(removed)
    }

    fn chunk_all<'a>(&self, documents: &[&'a Document]) -> Vec<(Chunk, &'a DocumentMetadata)> {
        documents
            .iter()
            .flat_map(|&document| {
                let metadata = document.metadata();
                chunk_document(document, &self.options.chunking)
                    .into_iter()
                    .map(move |chunk| (chunk, metadata))
            })
            .collect()
    }

    /// Embed every chunk, all batches finishing before anything is returned
    ///
    /// A vector of the wrong length is skipped, unless it is the very first one
    /// of a fresh collection, which aborts the run. Vectors with NaN or infinite
    /// components are always skipped.
    async fn embed_chunks(
        &self,
        chunks: Vec<(Chunk, &DocumentMetadata)>,
        dimension: usize,
        establishing: bool,
    ) -> Result<(Vec<IndexRecord>, Vec<SkippedChunk>)> {
        if chunks.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let batch_size = self.options.batch_size.max(1);
        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|(chunk, _)| chunk.text.clone()).collect())
            .collect();

        let bar = &self.progress;
        bar.set_position(0);
        bar.set_length(chunks.len() as u64);

        let embedder = &self.embedder;
        let result: Result<Vec<Vec<Vec<f32>>>> = stream::iter(batches)
            .map(|texts| async move {
                let vectors = embedder.embed_batch(&texts).await?;
                bar.inc(texts.len() as u64);
                Ok::<_, MemoryError>(vectors)
            })
            .buffered(self.options.concurrency.max(1))
            .try_collect()
            .await;

        let vectors = match result {
            Ok(vectors) => vectors,
            Err(e) => {
                bar.abandon();
                warn!("Embedding failed, abandoning ingestion: {}", e);
                return Err(e);
            }
        };
        bar.finish_and_clear();

        let mut records = Vec::with_capacity(chunks.len());
        let mut skipped = Vec::new();
        for ((chunk, metadata), vector) in chunks.into_iter().zip(vectors.into_iter().flatten()) {
            if vector.len() != dimension {
                if establishing && records.is_empty() && skipped.is_empty() {
                    return Err(MemoryError::EmbeddingDimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }

                warn!(
                    "Skipping chunk {} of {}: embedding has {} dimensions, expected {}",
                    chunk.chunk_id,
                    chunk.source_id,
                    vector.len(),
                    dimension
                );
                skipped.push(SkippedChunk {
                    reason: format!("expected {} dimensions, got {}", dimension, vector.len()),
                    chunk_id: chunk.chunk_id,
                    source_id: chunk.source_id,
                });
                continue;
            }

            if !is_finite(&vector) {
                warn!(
                    "Skipping chunk {} of {}: embedding has NaN or infinite components",
                    chunk.chunk_id, chunk.source_id
                );
                skipped.push(SkippedChunk {
                    reason: "embedding has NaN or infinite components".to_string(),
                    chunk_id: chunk.chunk_id,
                    source_id: chunk.source_id,
                });
                continue;
            }

            records.push(IndexRecord::from_chunk(chunk, metadata, vector));
        }

        Ok((records, skipped))
    }

    /// Persist `collection`, then make it the active one
    async fn publish(&self, collection: Collection) -> Result<()> {
        let collection = Arc::new(collection);

        let path = self.path.clone();
        let to_persist = Arc::clone(&collection);
        tokio::task::spawn_blocking(move || to_persist.persist(&path))
            .await
            .map_err(anyhow::Error::from)??;

        *self.active.write().await = Some(Arc::clone(&collection));
        info!(
            "Published {} generation {} ({} records)",
            collection.name(),
            collection.generation(),
            collection.len()
        );
        Ok(())
    }
}

/// Keep only the last document for each source id
fn latest_per_source(documents: &[Document]) -> Vec<&Document> {
    let mut latest: HashMap<&str, usize> = HashMap::new();
    for (i, document) in documents.iter().enumerate() {
        if latest.insert(document.source_id(), i).is_some() {
            warn!(
                "Source {} appears more than once; using its last document",
                document.source_id()
            );
        }
    }

    documents
        .iter()
        .enumerate()
        .filter(|(i, document)| latest.get(document.source_id()) == Some(i))
        .map(|(_, document)| document)
        .collect()
}
