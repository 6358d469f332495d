use super::*;
use crate::documents::DocumentMetadata;

fn document(source_id: &str, text: &str) -> Document {
    Document::new(source_id, text, DocumentMetadata::default()).expect("valid document")
}

fn config(max_chunk_chars: usize, overlap_chars: usize) -> ChunkingConfig {
    ChunkingConfig {
        max_chunk_chars,
        overlap_chars,
    }
}

#[test]
fn empty_and_whitespace_documents_yield_nothing() {
    let config = ChunkingConfig::default();
    assert!(chunk_document(&document("a", ""), &config).is_empty());
    assert!(chunk_document(&document("a", "  \n\n\t "), &config).is_empty());
}

#[test]
fn short_document_is_single_chunk() {
    let doc = document("notes", "  Meeting notes: discuss roadmap  ");
    let chunks = chunk_document(&doc, &ChunkingConfig::default());

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Meeting notes: discuss roadmap");
    assert_eq!(chunks[0].offset, 2);
    assert_eq!(chunks[0].ordinal, 0);
    assert_eq!(chunks[0].source_id, "notes");
    assert_eq!(chunks[0].chunk_id, chunk_id("notes", 2));
}

#[test]
fn chunks_never_exceed_max_length() {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
    let chunks = chunk_document(&document("fox", &text), &config(120, 30));

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 120, "chunk too long: {:?}", chunk.text);
        assert!(!chunk.text.is_empty());
    }
}

#[test]
fn prefers_paragraph_boundaries() {
    let first = "a".repeat(30);
    let second = "b".repeat(30);
    let text = format!("{} word.\n\n{} word.", first, second);
    let chunks = split_text(&text, &config(50, 0));

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].1, format!("{} word.", first));
    assert_eq!(chunks[1].1, format!("{} word.", second));
}

#[test]
fn prefers_sentence_boundaries_over_words() {
    let text = "First sentence is here. Second sentence follows it closely";
    let chunks = split_text(text, &config(40, 0));

    assert_eq!(chunks[0].1, "First sentence is here.");
}

#[test]
fn falls_back_to_hard_split_without_whitespace() {
    let text = "x".repeat(25);
    let chunks = split_text(&text, &config(10, 0));

    let lengths: Vec<usize> = chunks.iter().map(|(_, t)| t.len()).collect();
    assert_eq!(lengths, vec![10, 10, 5]);
    let offsets: Vec<usize> = chunks.iter().map(|(o, _)| *o).collect();
    assert_eq!(offsets, vec![0, 10, 20]);
}

#[test]
fn adjacent_chunks_share_overlap() {
    let text = (0..60).map(|i| format!("w{:02}", i)).collect::<Vec<_>>().join(" ");
    let chunks = split_text(&text, &config(60, 12));

    assert!(chunks.len() > 2);
    for pair in chunks.windows(2) {
        let (prev_offset, prev_text) = &pair[0];
        let (next_offset, _) = &pair[1];
        let prev_end = prev_offset + prev_text.chars().count();
        assert!(next_offset < &prev_end, "expected overlap between chunks");
        assert!(next_offset > prev_offset);
    }
}

#[test]
fn overlap_starts_on_word_boundary() {
    let text = (0..60).map(|i| format!("w{:02}", i)).collect::<Vec<_>>().join(" ");
    let chunks = split_text(&text, &config(60, 10));

    for (_, chunk_text) in chunks.iter().skip(1) {
        assert!(chunk_text.starts_with('w'), "chunk starts mid-word: {:?}", chunk_text);
        assert_eq!(chunk_text.split(' ').next().map(str::len), Some(3));
    }
}

#[test]
fn chunking_is_deterministic() {
    let text = "Paragraph one talks about plans.\n\nParagraph two is about groceries. ".repeat(20);
    let doc = document("log.txt", &text);
    let config = config(100, 20);

    assert_eq!(chunk_document(&doc, &config), chunk_document(&doc, &config));
}

#[test]
fn chunk_ids_depend_on_source_and_offset() {
    assert_eq!(chunk_id("a", 0), chunk_id("a", 0));
    assert_ne!(chunk_id("a", 0), chunk_id("a", 1));
    assert_ne!(chunk_id("a", 0), chunk_id("b", 0));
    assert_eq!(chunk_id("a", 0).len(), 64);
}

#[test]
fn multibyte_text_is_split_on_characters() {
    let text = "é".repeat(25);
    let chunks = split_text(&text, &config(10, 0));

    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|(_, t)| t.chars().count() <= 10));
}
