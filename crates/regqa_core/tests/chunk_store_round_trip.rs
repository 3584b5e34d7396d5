use pretty_assertions::assert_eq;
use tempfile::tempdir;

use regqa_core::chunk_store::{load_chunks, parse_chunks, render_chunks, save_chunks};
use regqa_core::chunking::parse_regulation_to_chunks;
use regqa_core::domain::Chunk;

#[test]
fn save_then_load_reproduces_chunks() {
    let text = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../fixtures/regulation_sample.txt"
    ));
    let chunks = parse_regulation_to_chunks(text);
    assert!(chunks.iter().any(|c| c.text.contains('\n')));

    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("chunks.txt");
    save_chunks(&chunks, &path).expect("save");

    let loaded = load_chunks(&path).expect("load");
    assert_eq!(loaded.skipped_blocks, 0);
    assert_eq!(loaded.chunks, chunks);
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn round_trip_keeps_tabs_in_text_and_titles_with_spaces() {
    let chunks = vec![
        Chunk::new("12", "Title with  spaces", "3", "col1\tcol2\nsecond line\n\nthird paragraph"),
        Chunk::new("12", "Title with  spaces", "4", "ID: looks like a label but is text"),
    ];
    let loaded = parse_chunks(&render_chunks(&chunks));
    assert_eq!(loaded.chunks, chunks);
}

#[test]
fn missing_file_is_a_store_error() {
    let dir = tempdir().unwrap();
    let err = load_chunks(&dir.path().join("nope.txt")).expect_err("missing");
    assert_eq!(err.code, "CHUNK_STORE_FAILED");
}
