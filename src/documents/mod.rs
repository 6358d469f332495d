// Document sources
// Turns chat logs on disk into validated documents ready for chunking

pub mod chatgpt;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{MemoryError, Result};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "json"];

/// Where a document came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// File name of the log or note, if it came from disk
    pub file_name: Option<String>,
    /// When the source was written
    pub timestamp: Option<DateTime<Utc>>,
}

/// A source unit of text, such as one exported conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    source_id: String,
    text: String,
    metadata: DocumentMetadata,
}

impl Document {
    /// Build a document, rejecting identifiers that cannot be stored or deleted reliably
    #[inline]
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        metadata: DocumentMetadata,
    ) -> Result<Self> {
        let source_id = source_id.into();

        if source_id.trim().is_empty() {
            return Err(MemoryError::InvalidDocument(
                "source id cannot be empty".to_string(),
            ));
        }

        if source_id.chars().any(char::is_control) {
            return Err(MemoryError::InvalidDocument(format!(
                "source id contains control characters: {:?}",
                source_id
            )));
        }

        Ok(Self {
            source_id,
            text: text.into(),
            metadata,
        })
    }

    #[inline]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }
}

/// A single turn in a JSON chat log
#[derive(Debug, Clone, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Result of scanning a directory of logs
#[derive(Debug, Default)]
pub struct DirectoryLoad {
    pub documents: Vec<Document>,
    /// File names that could not be turned into documents, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Load every supported log file directly inside `dir`, ordered by file name
#[inline]
pub fn load_directory(dir: &Path) -> Result<DirectoryLoad> {
    debug!("Scanning {} for chat logs", dir.display());

    let mut paths = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_supported_extension(path))
        .collect::<Vec<_>>();
    paths.sort();

    let mut load = DirectoryLoad::default();
    for path in paths {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match load_file(&path, &file_name) {
            Ok(document) => load.documents.push(document),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                load.skipped.push((file_name, e.to_string()));
            }
        }
    }

    info!(
        "Loaded {} documents from {} ({} skipped)",
        load.documents.len(),
        dir.display(),
        load.skipped.len()
    );
    Ok(load)
}

/// Load one log file; the file name doubles as the stable source id
#[inline]
pub fn load_file(path: &Path, file_name: &str) -> Result<Document> {
    let raw = fs::read_to_string(path)?;

    let text = if path.extension().is_some_and(|ext| ext == "json") {
        render_chat_log(&raw)?
    } else {
        raw
    };

    let timestamp = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    Document::new(
        file_name,
        text,
        DocumentMetadata {
            file_name: Some(file_name.to_string()),
            timestamp,
        },
    )
}

/// Render a JSON array of `{role, content}` messages as `role: content` lines
fn render_chat_log(raw: &str) -> Result<String> {
    let messages: Vec<ChatMessage> = serde_json::from_str(raw)
        .map_err(|e| MemoryError::InvalidDocument(format!("malformed chat log: {}", e)))?;

    Ok(messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .join("\n"))
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
