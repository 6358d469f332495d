use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn empty_source_id_is_rejected() {
    let result = Document::new("  ", "text", DocumentMetadata::default());
    assert!(matches!(result, Err(MemoryError::InvalidDocument(_))));
}

#[test]
fn control_characters_in_source_id_are_rejected() {
    let result = Document::new("a\nb", "text", DocumentMetadata::default());
    assert!(matches!(result, Err(MemoryError::InvalidDocument(_))));
}

#[test]
fn empty_text_is_allowed() {
    let doc = Document::new("notes.txt", "", DocumentMetadata::default())
        .expect("empty text should be a valid document");
    assert_eq!(doc.source_id(), "notes.txt");
    assert!(doc.text().is_empty());
}

#[test]
fn load_directory_reads_supported_files_in_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path();

    fs::write(dir.join("b_notes.md"), "# Roadmap\n\nShip it").expect("should write md");
    fs::write(dir.join("a_log.txt"), "USER: hello").expect("should write txt");
    fs::write(
        dir.join("c_chat.json"),
        r#"[{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]"#,
    )
    .expect("should write json");
    fs::write(dir.join("ignored.csv"), "a,b").expect("should write csv");

    let load = load_directory(dir).expect("directory should load");

    let ids: Vec<&str> = load.documents.iter().map(Document::source_id).collect();
    assert_eq!(ids, vec!["a_log.txt", "b_notes.md", "c_chat.json"]);
    assert!(load.skipped.is_empty());

    let chat = &load.documents[2];
    assert_eq!(chat.text(), "user: hi\nassistant: hello");
    assert_eq!(chat.metadata().file_name.as_deref(), Some("c_chat.json"));
    assert!(chat.metadata().timestamp.is_some());
}

#[test]
fn malformed_json_logs_are_skipped() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path();

    fs::write(dir.join("broken.json"), "{not json").expect("should write json");
    fs::write(dir.join("fine.txt"), "still here").expect("should write txt");

    let load = load_directory(dir).expect("directory should load");

    assert_eq!(load.documents.len(), 1);
    assert_eq!(load.skipped.len(), 1);
    assert_eq!(load.skipped[0].0, "broken.json");
}

#[test]
fn missing_directory_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = load_directory(&temp_dir.path().join("nope"));
    assert!(matches!(result, Err(MemoryError::Io(_))));
}
