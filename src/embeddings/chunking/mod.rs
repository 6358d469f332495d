#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::documents::Document;

/// A bounded slice of a document, the unit that gets embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id derived from the source id and the offset
    pub chunk_id: String,
    /// Source id of the parent document
    pub source_id: String,
    /// Position of this chunk within the document
    pub ordinal: usize,
    /// Character offset of the first character of `text` in the document
    pub offset: usize,
    /// The chunk text, trimmed
    pub text: String,
}

/// Configuration for text chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_chunk_chars: usize,
    /// Characters repeated from the end of a chunk at the start of the next one,
    /// capped at half of `max_chunk_chars`
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_chars: 800,
            overlap_chars: 100,
        }
    }
}

/// Split a document into ordered chunks
///
/// Empty or whitespace-only documents produce no chunks.
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks = split_text(document.text(), config)
        .into_iter()
        .enumerate()
        .map(|(ordinal, (offset, text))| Chunk {
            chunk_id: chunk_id(document.source_id(), offset),
            source_id: document.source_id().to_string(),
            ordinal,
            offset,
            text,
        })
        .collect::<Vec<_>>();

    debug!(
        "Chunked '{}' into {} chunks (avg {} chars)",
        document.source_id(),
        chunks.len(),
        chunks.iter().map(|c| c.text.chars().count()).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Stable chunk identifier for a source id and character offset
#[inline]
pub fn chunk_id(source_id: &str, offset: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0_u8]);
    hasher.update(offset.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split text into `(offset, text)` pairs no longer than `max_chunk_chars`
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<(usize, String)> {
    let chars = text.chars().collect::<Vec<_>>();
    let max = config.max_chunk_chars.max(1);
    let overlap = config.overlap_chars.min(max / 2);

    let mut splits = Vec::new();
    let mut start = 0;
    let mut covered = 0;

    loop {
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }

        let end = if chars.len() - start <= max {
            chars.len()
        } else {
            find_break(&chars, start, start + max, covered)
        };

        let piece = chars[start..end].iter().collect::<String>();
        let piece = piece.trim_end();
        if !piece.is_empty() {
            splits.push((start, piece.to_string()));
        }

        if end >= chars.len() {
            break;
        }

        start = next_start(&chars, start, end, overlap);
        covered = end;
    }

    splits
}

/// Pick the exclusive end of a chunk starting at `start` that may not exceed `limit`
///
/// The end always lies past `covered`, the end of the previous chunk, so overlapping
/// chunks still make progress.
fn find_break(chars: &[char], start: usize, limit: usize, covered: usize) -> usize {
    // Breaks too close to the start would produce slivers
    let lower = (start + (limit - start) / 4).max(covered);

    let paragraph = |b: usize| b >= 2 && chars[b - 1] == '\n' && chars[b - 2] == '\n';
    let line = |b: usize| chars[b - 1] == '\n';
    let sentence = |b: usize| matches!(chars[b - 1], '.' | '!' | '?') && chars[b].is_whitespace();
    let word = |b: usize| chars[b].is_whitespace();

    let rules: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &line, &sentence, &word];
    for rule in rules {
        if let Some(b) = (lower + 1..=limit).rev().find(|&b| rule(b)) {
            return b;
        }
    }

    limit
}

/// Start of the chunk that follows one spanning `start..end`
fn next_start(chars: &[char], start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }

    let mut next = end.saturating_sub(overlap).max(start + 1);

    // Avoid starting the overlap in the middle of a word
    if !chars[next - 1].is_whitespace() {
        if let Some(space) = (next..end).find(|&i| chars[i].is_whitespace()) {
            next = space + 1;
        }
    }

    next
}
