//! Durable JSON-lines format for collections.
//!
//! The first line is an [`IndexHeader`]; every following line is one
//! [`IndexRecord`]. The header's checksum is the SHA-256 of all bytes after the
//! header line, so truncation or editing of the record section is detected on
//! load. Files are replaced by writing a temporary sibling, syncing it, and
//! renaming it over the old file.


use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collection::Collection;
use super::search::SearchIndex;
use super::IndexRecord;
use crate::{MemoryError, Result};

pub const FORMAT_NAME: &str = "memory-search-index";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub format: String,
    pub version: u32,
    pub name: String,
    pub dimension: usize,
    pub record_count: usize,
    pub generation: u64,
    pub checksum: String,
}

impl<I: SearchIndex> Collection<I> {
    /// Atomically replace the file at `path` with this collection
    ///
    /// The previous file stays intact if writing fails part way.
    #[inline]
    pub fn persist(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut body = Vec::new();
        for record in self.records() {
            serde_json::to_writer(&mut body, record).map_err(std::io::Error::from)?;
            body.push(b'\n');
        }

        let header = IndexHeader {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            name: self.name().to_string(),
            dimension: self.dimension(),
            record_count: self.len(),
            generation: self.generation(),
            checksum: checksum(&body),
        };

        let temp_path = temp_path_for(path);
        if let Err(e) = write_synced(&temp_path, &header, &body) {
            warn!(
                "Failed to write {}: {}; keeping previous index",
                temp_path.display(),
                e
            );
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        sync_parent(parent);

        info!(
            "Persisted {} ({} records, generation {}) to {}",
            self.name(),
            self.len(),
            self.generation(),
            path.display()
        );
        Ok(())
    }

    /// Read a collection written by [`Collection::persist`]
    ///
    /// Any disagreement between header and contents is a `CorruptIndex` error.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;

        let newline = bytes
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| MemoryError::corrupt(path, "missing header line"))?;
        let (header_bytes, rest) = bytes.split_at(newline);
        let body = rest.get(1..).unwrap_or_default();

        let header: IndexHeader = serde_json::from_slice(header_bytes)
            .map_err(|e| MemoryError::corrupt(path, format!("unreadable header: {e}")))?;

        if header.format != FORMAT_NAME {
            return Err(MemoryError::corrupt(
                path,
                format!("unknown format {:?}", header.format),
            ));
        }
        if header.version != FORMAT_VERSION {
            return Err(MemoryError::corrupt(
                path,
                format!("unsupported format version {}", header.version),
            ));
        }

        let actual = checksum(body);
        if actual != header.checksum {
            return Err(MemoryError::corrupt(
                path,
                format!(
                    "checksum mismatch: header says {}, contents hash to {}",
                    header.checksum, actual
                ),
            ));
        }

        // record_count is not covered by the checksum; size from the body instead
        let mut records = Vec::new();
        for (line_number, line) in body.split(|b| *b == b'\n').enumerate() {
            if line.is_empty() {
                continue;
            }
            let record: IndexRecord = serde_json::from_slice(line).map_err(|e| {
                MemoryError::corrupt(path, format!("record {} unreadable: {e}", line_number + 1))
            })?;
            if record.vector.len() != header.dimension {
                return Err(MemoryError::corrupt(
                    path,
                    format!(
                        "record {} has {} dimensions, header declares {}",
                        record.chunk_id,
                        record.vector.len(),
                        header.dimension
                    ),
                ));
            }
            records.push(record);
        }

        if records.len() != header.record_count {
            return Err(MemoryError::corrupt(
                path,
                format!(
                    "header declares {} records, found {}",
                    header.record_count,
                    records.len()
                ),
            ));
        }

        let collection = Self::restore(header.name, header.dimension, header.generation, records)
            .map_err(|e| MemoryError::corrupt(path, e.to_string()))?;

        debug!(
            "Loaded {} ({} records, generation {}) from {}",
            collection.name(),
            collection.len(),
            collection.generation(),
            path.display()
        );
        Ok(collection)
    }
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map_or_else(|| "index".to_string(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()))
}

fn write_synced(path: &Path, header: &IndexHeader, body: &[u8]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer(&mut writer, header).map_err(std::io::Error::from)?;
    writer.write_all(b"\n")?;
    writer.write_all(body)?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Sync the directory entry of a completed rename, returning whether it succeeded
///
/// The new file is already in place at this point, so failure only weakens
/// durability across a crash and is not reported as an error.
fn sync_parent(dir: &Path) -> bool {
    match sync_dir(dir) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to sync directory {}: {}", dir.display(), e);
            false
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
