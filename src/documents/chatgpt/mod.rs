// ChatGPT export support
// Reads `conversations.json` from a ChatGPT data export

#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Document, DocumentMetadata};
use crate::{MemoryError, Result};

const MAX_TITLE_CHARS: usize = 50;
const ILLEGAL_FILENAME_CHARS: [char; 10] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\''];

/// Conversations recovered from an export
#[derive(Debug, Default)]
pub struct ChatGptExport {
    pub documents: Vec<Document>,
    /// Message nodes that were present but could not be read
    pub skipped_messages: usize,
    /// Conversations with messages that still could not become a document
    pub skipped_conversations: usize,
}

/// Strip control characters and characters not allowed in file names, and cap the length
#[inline]
pub fn clean_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_FILENAME_CHARS.contains(c))
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Read and parse an export file
#[inline]
pub fn load_export(path: &Path) -> Result<ChatGptExport> {
    let raw = fs::read_to_string(path)?;
    let export = parse_export(&raw)?;

    info!(
        "Parsed {} conversations from {} ({} messages and {} conversations skipped)",
        export.documents.len(),
        path.display(),
        export.skipped_messages,
        export.skipped_conversations
    );
    Ok(export)
}

/// Parse the export JSON: one document per conversation that has readable messages
#[inline]
pub fn parse_export(raw: &str) -> Result<ChatGptExport> {
    let data: Value = serde_json::from_str(raw)
        .map_err(|e| MemoryError::InvalidDocument(format!("malformed ChatGPT export: {}", e)))?;

    let conversations = data.as_array().ok_or_else(|| {
        MemoryError::InvalidDocument("ChatGPT export must be a JSON array".to_string())
    })?;

    let mut export = ChatGptExport::default();

    for (i, conversation) in conversations.iter().enumerate() {
        let title = conversation
            .get("title")
            .and_then(Value::as_str)
            .map_or_else(|| format!("conversation_{}", i), ToString::to_string);
        let source_id = format!("{:03}_{}", i, clean_title(&title));

        let mut lines = Vec::new();
        if let Some(mapping) = conversation.get("mapping").and_then(Value::as_object) {
            for node in mapping.values() {
                let Some(message) = node.get("message").filter(|m| !m.is_null()) else {
                    continue;
                };
                match render_message(message) {
                    Some(Some(line)) => lines.push(line),
                    Some(None) => {}
                    None => export.skipped_messages += 1,
                }
            }
        }

        if lines.is_empty() {
            debug!("Conversation {} has no readable messages", source_id);
            continue;
        }

        let timestamp = conversation
            .get("create_time")
            .and_then(Value::as_f64)
            .and_then(epoch_to_datetime);

        let document = Document::new(
            source_id.clone(),
            lines.join("\n"),
            DocumentMetadata {
                file_name: Some(format!("{}.txt", source_id)),
                timestamp,
            },
        );
        match document {
            Ok(document) => export.documents.push(document),
            Err(e) => {
                warn!("Skipping conversation {:?}: {}", source_id, e);
                export.skipped_conversations += 1;
            }
        }
    }

    Ok(export)
}

/// Write every conversation as `NNN_<title>.txt` under `out_dir`
#[inline]
pub fn export_conversations(export_path: &Path, out_dir: &Path) -> Result<ChatGptExport> {
    let export = load_export(export_path)?;
    fs::create_dir_all(out_dir)?;

    for document in &export.documents {
        let path = out_dir.join(format!("{}.txt", document.source_id()));
        let mut body = document.text().to_string();
        body.push('\n');
        fs::write(&path, body)?;
        debug!("Wrote {}", path.display());
    }

    Ok(export)
}

/// `None` when the node is malformed, `Some(None)` when it is well-formed but empty
fn render_message(message: &Value) -> Option<Option<String>> {
    let role = message.get("author")?.get("role")?.as_str()?;
    let parts = message.get("content")?.get("parts");

    let Some(parts) = parts.and_then(Value::as_array) else {
        return Some(None);
    };
    let Some(first) = parts.first() else {
        return Some(None);
    };

    let content = first.as_str()?;
    Some(Some(format!("{}: {}", role.to_uppercase(), content)))
}

fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.trunc() as i64;
    let nanos = (seconds.fract() * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos)
}
