
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use super::search::{FlatIndex, SearchIndex, is_finite};
use super::{IndexRecord, SearchResult};
use crate::{MemoryError, Result};

/// A named set of records sharing one vector dimensionality
///
/// Records keep their insertion order; an overwritten record moves to the end.
#[derive(Debug, Clone)]
pub struct Collection<I: SearchIndex = FlatIndex> {
    name: String,
    dimension: usize,
    generation: u64,
    records: Vec<IndexRecord>,
    positions: HashMap<String, usize>,
    index: I,
}

impl<I: SearchIndex> Collection<I> {
    #[inline]
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self::starting_at(name, dimension, 0)
    }

    /// An empty collection whose next commit yields `generation + 1`
    #[inline]
    pub fn starting_at(name: impl Into<String>, dimension: usize, generation: u64) -> Self {
        Self {
            name: name.into(),
            dimension,
            generation,
            records: Vec::new(),
            positions: HashMap::new(),
            index: I::with_dimension(dimension),
        }
    }

    /// Rebuild a collection from records read back from disk
    pub(crate) fn restore(
        name: String,
        dimension: usize,
        generation: u64,
        records: Vec<IndexRecord>,
    ) -> Result<Self> {
        let mut collection = Self::starting_at(name, dimension, generation);
        for record in records {
            collection.validate(&record)?;
            if collection.positions.contains_key(&record.chunk_id) {
                return Err(MemoryError::Other(anyhow::anyhow!(
                    "duplicate chunk id {}",
                    record.chunk_id
                )));
            }
            collection.push(record);
        }
        Ok(collection)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order
    #[inline]
    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    #[inline]
    pub fn get(&self, chunk_id: &str) -> Option<&IndexRecord> {
        self.positions
            .get(chunk_id)
            .and_then(|slot| self.records.get(*slot))
    }

    #[inline]
    pub fn contains_source(&self, source_id: &str) -> bool {
        self.records.iter().any(|r| r.source_id() == source_id)
    }

    #[inline]
    pub fn source_count(&self) -> usize {
        self.records
            .iter()
            .map(IndexRecord::source_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Record count per source id, sorted by source id
    #[inline]
    pub fn sources(&self) -> BTreeMap<&str, usize> {
        let mut sources = BTreeMap::new();
        for record in &self.records {
            *sources.entry(record.source_id()).or_insert(0) += 1;
        }
        sources
    }

    /// Check a record against this collection without applying it
    #[inline]
    pub fn validate(&self, record: &IndexRecord) -> Result<()> {
        if record.chunk_id.is_empty() {
            return Err(MemoryError::InvalidDocument(format!(
                "record from {:?} has an empty chunk id",
                record.source_id()
            )));
        }

        if record.vector.len() != self.dimension {
            return Err(MemoryError::EmbeddingDimensionMismatch {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }

        if !is_finite(&record.vector) {
            return Err(MemoryError::InvalidDocument(format!(
                "record {} has NaN or infinite vector components",
                record.chunk_id
            )));
        }

        Ok(())
    }

    /// Insert or overwrite records by chunk id as one commit
    ///
    /// Every record is validated first; nothing is applied if any fails.
    #[inline]
    pub fn upsert(&mut self, records: Vec<IndexRecord>) -> Result<u64> {
        self.commit(&HashSet::new(), records)
    }

    /// Drop every record of the given sources and insert `records`, as one commit
    #[inline]
    pub fn replace_sources(
        &mut self,
        source_ids: &HashSet<String>,
        records: Vec<IndexRecord>,
    ) -> Result<u64> {
        self.commit(source_ids, records)
    }

    /// Remove all records of `source_id`, returning how many were removed
    ///
    /// The generation only advances when something was removed.
    #[inline]
    pub fn delete(&mut self, source_id: &str) -> usize {
        let keep: Vec<bool> = self
            .records
            .iter()
            .map(|r| r.source_id() != source_id)
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();

        if removed > 0 {
            self.retain_slots(&keep);
            self.generation += 1;
            debug!(
                "Removed {} records of {} from {} (generation {})",
                removed, source_id, self.name, self.generation
            );
        }

        removed
    }

    /// The `k` records most similar to `query`, best first
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(MemoryError::InvalidQuery(
                "k must be at least 1".to_string(),
            ));
        }

        if query.len() != self.dimension {
            return Err(MemoryError::EmbeddingDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if !is_finite(query) {
            return Err(MemoryError::InvalidQuery(
                "query vector has NaN or infinite components".to_string(),
            ));
        }

        Ok(self
            .index
            .search(query, k)
            .into_iter()
            .filter_map(|neighbor| {
                self.records.get(neighbor.slot).map(|record| SearchResult {
                    record: record.clone(),
                    score: neighbor.score,
                })
            })
            .collect())
    }

    fn commit(&mut self, remove_sources: &HashSet<String>, records: Vec<IndexRecord>) -> Result<u64> {
        for record in &records {
            self.validate(record)?;
        }

        let mut keep: Vec<bool> = self
            .records
            .iter()
            .map(|r| !remove_sources.contains(r.source_id()))
            .collect();

        // Later duplicates within the batch win
        let mut pending: Vec<Option<IndexRecord>> = Vec::with_capacity(records.len());
        let mut pending_positions: HashMap<String, usize> = HashMap::new();
        for record in records {
            if let Some(slot) = self.positions.get(&record.chunk_id) {
                keep[*slot] = false;
            }
            if let Some(previous) = pending_positions.insert(record.chunk_id.clone(), pending.len())
            {
                pending[previous] = None;
            }
            pending.push(Some(record));
        }

        self.retain_slots(&keep);
        for record in pending.into_iter().flatten() {
            self.push(record);
        }

        self.generation += 1;
        debug!(
            "Committed {} with {} records (generation {})",
            self.name,
            self.records.len(),
            self.generation
        );
        Ok(self.generation)
    }

    fn push(&mut self, record: IndexRecord) {
        self.positions
            .insert(record.chunk_id.clone(), self.records.len());
        self.index.push(&record.vector);
        self.records.push(record);
    }

    fn retain_slots(&mut self, keep: &[bool]) {
        if keep.iter().all(|k| *k) {
            return;
        }

        let mut flags = keep.iter();
        self.records.retain(|_| flags.next().copied().unwrap_or(true));
        self.index.retain(keep);

        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(slot, record)| (record.chunk_id.clone(), slot))
            .collect();
    }
}
