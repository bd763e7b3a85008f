use super::*;
use std::fs;
use tempfile::TempDir;

fn test_chunker() -> TokenChunker {
    TokenChunker::new().expect("chunker should initialize")
}

fn marker(line: usize, heading: &str) -> SectionMarker {
    SectionMarker {
        line,
        heading: heading.to_string(),
    }
}

#[test]
fn window_count_matches_formula() {
    for (token_count, window_size, overlap) in [
        (10, 4, 1),
        (100, 10, 3),
        (500, 500, 50),
        (1000, 500, 50),
        (950, 500, 50),
        (7, 4, 1),
        (1, 4, 1),
    ] {
        let spans = window_spans(token_count, window_size, overlap);
        let stride = window_size - overlap;
        let expected = (token_count - overlap).div_ceil(stride);
        assert_eq!(
            spans.len(),
            expected.max(1),
            "token_count={} window={} overlap={}",
            token_count,
            window_size,
            overlap
        );
    }
}

#[test]
fn consecutive_windows_share_overlap() {
    for (token_count, window_size, overlap) in [(10, 4, 1), (100, 10, 3), (1000, 500, 50)] {
        let spans = window_spans(token_count, window_size, overlap);
        for pair in spans.windows(2) {
            let shared = pair[0].1 - pair[1].0;
            assert_eq!(shared, overlap, "spans {:?} should share overlap", pair);
        }
    }
}

#[test]
fn window_spans_cover_sequence_in_order() {
    let spans = window_spans(100, 10, 3);

    assert_eq!(spans.first(), Some(&(0, 10)));
    assert_eq!(spans.last().map(|s| s.1), Some(100));
    for pair in spans.windows(2) {
        assert!(pair[0].0 < pair[1].0, "starts must strictly increase");
    }
}

#[test]
fn short_sequence_yields_single_window() {
    // A sequence no longer than the overlap still produces its one window.
    assert_eq!(window_spans(3, 10, 5), vec![(0, 3)]);
    assert_eq!(window_spans(5, 10, 5), vec![(0, 5)]);
}

#[test]
fn empty_sequence_yields_no_windows() {
    assert!(window_spans(0, 10, 3).is_empty());
}

#[test]
fn section_attribution_is_monotonic() {
    let markers = vec![marker(5, "1 Intro"), marker(20, "2 Methods"), marker(40, "3 Results")];

    assert_eq!(section_for_prefix(&markers, 3), DEFAULT_SECTION);
    assert_eq!(section_for_prefix(&markers, 5), "1 Intro");
    assert_eq!(section_for_prefix(&markers, 22), "2 Methods");
    assert_eq!(section_for_prefix(&markers, 40), "3 Results");
    assert_eq!(section_for_prefix(&markers, 1000), "3 Results");
}

#[test]
fn section_default_without_markers() {
    assert_eq!(section_for_prefix(&[], 17), DEFAULT_SECTION);
}

#[test]
fn heading_pattern_detection() {
    let chunker = test_chunker();
    let lines = vec![
        "Attention Is All You Need",
        "1 Introduction",
        "The dominant sequence transduction models are based on recurrence.",
        "2.1 Related Work",
        "several lowercase words here",
        "3.10 Deeply Nested Heading",
    ];

    let markers = chunker.scan_section_markers(&lines);

    assert_eq!(
        markers,
        vec![
            marker(1, "1 Introduction"),
            marker(3, "2.1 Related Work"),
            marker(5, "3.10 Deeply Nested Heading"),
        ]
    );
}

#[test]
fn heading_pattern_rejects_lowercase_titles() {
    let chunker = test_chunker();
    let lines = vec!["2.1 related work", "10 points were scored"];

    assert!(chunker.scan_section_markers(&lines).is_empty());
}

#[test]
fn chunk_text_produces_labeled_chunks() {
    let chunker = test_chunker();
    let body = "The quick brown fox jumps over the lazy dog. ".repeat(30);
    let text = format!(
        "Paper Title\nSome opening remarks before any heading.\n1 Introduction\n{}\n2 Methods\n{}",
        body, body
    );

    let chunks = chunker.chunk_text("paper.pdf", &text, 40, 10);

    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.file == "paper.pdf"));
    assert!(chunks.iter().all(|c| !c.text.is_empty()));
    assert_eq!(chunks[0].section, DEFAULT_SECTION);
    assert!(
        chunks.iter().any(|c| c.section == "2 Methods"),
        "later chunks should pick up the second heading"
    );
}

#[test]
fn chunk_text_drops_blank_lines_before_attribution() {
    let chunker = test_chunker();
    let text = "\n\n1 Introduction\n\n\nBody text for the first section.\n\n";

    let chunks = chunker.chunk_text("paper.pdf", text, 500, 50);

    assert_eq!(chunks.len(), 1);
    // The heading is line zero once blanks are dropped, so the single
    // window is attributed to it.
    assert_eq!(chunks[0].section, "1 Introduction");
}

#[test]
fn chunk_text_empty_input() {
    let chunker = test_chunker();
    assert!(chunker.chunk_text("paper.pdf", "", 500, 50).is_empty());
    assert!(chunker.chunk_text("paper.pdf", "\n \n", 500, 50).is_empty());
}

#[test]
fn chunk_documents_requires_existing_folder() {
    let chunker = test_chunker();
    let result = chunker.chunk_documents(std::path::Path::new("/nonexistent/folder"), 500, 50);
    assert!(result.is_err());
}

#[test]
fn chunk_documents_rejects_oversized_overlap() {
    let chunker = test_chunker();
    let temp_dir = TempDir::new().expect("should create TempDir");

    let result = chunker.chunk_documents(temp_dir.path(), 50, 50);
    assert!(result.is_err());
}

#[test]
fn chunk_documents_ignores_non_pdf_files() {
    let chunker = test_chunker();
    let temp_dir = TempDir::new().expect("should create TempDir");
    fs::write(temp_dir.path().join("notes.txt"), "not a pdf").expect("should write file");

    let chunks = chunker
        .chunk_documents(temp_dir.path(), 500, 50)
        .expect("chunking an empty corpus should succeed");
    assert!(chunks.is_empty());
}

#[test]
fn chunk_documents_skips_unreadable_pdf() {
    let chunker = test_chunker();
    let temp_dir = TempDir::new().expect("should create TempDir");
    fs::write(temp_dir.path().join("broken.pdf"), b"definitely not a pdf")
        .expect("should write file");

    let chunks = chunker
        .chunk_documents(temp_dir.path(), 500, 50)
        .expect("a corrupt document is skipped, not fatal");
    assert!(chunks.is_empty());
}
