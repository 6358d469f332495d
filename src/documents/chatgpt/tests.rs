use super::*;
use tempfile::TempDir;

const SAMPLE_EXPORT: &str = r#"[
  {
    "title": "Roadmap: Q3/Q4?",
    "create_time": 1700000000.5,
    "mapping": {
      "root": { "message": null },
      "n1": {
        "message": {
          "author": { "role": "user" },
          "content": { "parts": ["What is on the roadmap?"] }
        }
      },
      "n2": {
        "message": {
          "author": { "role": "assistant" },
          "content": { "parts": ["Search, then sync."] }
        }
      },
      "n3": {
        "message": {
          "author": { "role": "tool" },
          "content": { "parts": [{ "image": true }] }
        }
      }
    }
  },
  {
    "title": "Empty",
    "mapping": {
      "root": { "message": null }
    }
  },
  {
    "mapping": {
      "n1": {
        "message": {
          "author": { "role": "user" },
          "content": { "parts": ["untitled chat"] }
        }
      }
    }
  }
]"#;

#[test]
fn clean_title_strips_illegal_characters() {
    assert_eq!(clean_title("a<b>c:d\"e/f\\g|h?i*j'k"), "abcdefghijk");
}

#[test]
fn clean_title_truncates() {
    let long = "x".repeat(80);
    assert_eq!(clean_title(&long).chars().count(), 50);
}

#[test]
fn parse_export_builds_one_document_per_conversation() {
    let export = parse_export(SAMPLE_EXPORT).expect("export should parse");

    assert_eq!(export.documents.len(), 2);
    assert_eq!(export.skipped_messages, 1);

    let first = &export.documents[0];
    assert_eq!(first.source_id(), "000_Roadmap Q3Q4");
    assert_eq!(
        first.text(),
        "USER: What is on the roadmap?\nASSISTANT: Search, then sync."
    );
    assert_eq!(
        first.metadata().timestamp.map(|t| t.timestamp()),
        Some(1_700_000_000)
    );

    // Index numbering counts skipped conversations too
    let untitled = &export.documents[1];
    assert_eq!(untitled.source_id(), "002_conversation_2");
    assert!(untitled.metadata().timestamp.is_none());
}

#[test]
fn parse_export_rejects_non_array() {
    let result = parse_export(r#"{"title": "nope"}"#);
    assert!(matches!(result, Err(MemoryError::InvalidDocument(_))));
}

#[test]
fn export_conversations_writes_text_files() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let export_path = temp_dir.path().join("conversations.json");
    fs::write(&export_path, SAMPLE_EXPORT).expect("should write export");

    let out_dir = temp_dir.path().join("extracted");
    let export = export_conversations(&export_path, &out_dir).expect("export should succeed");

    assert_eq!(export.documents.len(), 2);
    let written = fs::read_to_string(out_dir.join("000_Roadmap Q3Q4.txt"))
        .expect("conversation file should exist");
    assert!(written.starts_with("USER: What is on the roadmap?"));
    assert!(written.ends_with('\n'));
}

#[test]
fn control_characters_in_titles_do_not_sink_the_export() {
    let raw = r#"[
      {
        "title": "good",
        "mapping": {
          "a": { "message": { "author": { "role": "user" }, "content": { "parts": ["kept"] } } }
        }
      },
      {
        "title": "bad\ttitle\nhere",
        "mapping": {
          "a": { "message": { "author": { "role": "user" }, "content": { "parts": ["also kept"] } } }
        }
      }
    ]"#;

    let export = parse_export(raw).expect("export should parse");

    assert_eq!(export.documents.len(), 2);
    assert_eq!(export.skipped_conversations, 0);
    assert_eq!(export.documents[0].source_id(), "000_good");
    assert_eq!(export.documents[1].source_id(), "001_badtitlehere");
}

#[test]
fn clean_title_strips_control_characters() {
    assert_eq!(clean_title("a\tb\nc\u{7f}d"), "abcd");
}
