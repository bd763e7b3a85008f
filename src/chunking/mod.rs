#[cfg(test)]
mod tests;

use anyhow::{Context, Result, bail};
use fancy_regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::{debug, warn};

/// Heading lines look like "2.1 Related Work": a dotted section number
/// followed by a capitalized title.
const SECTION_PATTERN: &str = r"^\s*\d+(\.\d+)*\s+[A-Z][A-Za-z0-9 ,\-]+";

/// Label applied to chunks that precede the first detected heading.
pub const DEFAULT_SECTION: &str = "Introduction";

/// A retrievable window of document text, tagged with its source file and
/// the nearest preceding section heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub file: String,
    pub section: String,
    pub text: String,
}

/// A heading line and its position within the cleaned document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMarker {
    pub line: usize,
    pub heading: String,
}

/// Token-aware chunker over a folder of PDF documents.
pub struct TokenChunker {
    bpe: CoreBPE,
    heading_pattern: Regex,
}

impl TokenChunker {
    #[inline]
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().context("Failed to load cl100k_base token vocabulary")?;
        let heading_pattern =
            Regex::new(SECTION_PATTERN).context("Failed to compile section heading pattern")?;

        Ok(Self {
            bpe,
            heading_pattern,
        })
    }

    /// Chunk every PDF in `folder` into overlapping token windows.
    ///
    /// Documents are visited in lexicographic filename order so chunk
    /// ordering is reproducible across runs. A document that fails to open
    /// or parse is skipped whole with a warning.
    #[inline]
    pub fn chunk_documents(
        &self,
        folder: &Path,
        window_size: usize,
        overlap: usize,
    ) -> Result<Vec<DocumentChunk>> {
        if !folder.is_dir() {
            bail!("PDF folder not found: {}", folder.display());
        }

        if overlap >= window_size {
            bail!(
                "Overlap ({}) must be smaller than the window size ({})",
                overlap,
                window_size
            );
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(folder)
            .with_context(|| format!("Failed to read PDF folder: {}", folder.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .collect();
        paths.sort();

        let mut chunks = Vec::new();

        for path in paths {
            match self.chunk_file(&path, window_size, overlap) {
                Ok(file_chunks) => {
                    debug!(
                        "Chunked {} into {} windows",
                        path.display(),
                        file_chunks.len()
                    );
                    chunks.extend(file_chunks);
                }
                Err(e) => {
                    warn!("Failed to read PDF {}: {}", path.display(), e);
                }
            }
        }

        Ok(chunks)
    }

    fn chunk_file(
        &self,
        path: &Path,
        window_size: usize,
        overlap: usize,
    ) -> Result<Vec<DocumentChunk>> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .with_context(|| format!("Invalid file name: {}", path.display()))?;

        let raw_text = pdf_extract::extract_text(path)
            .with_context(|| format!("Failed to extract text from {}", path.display()))?;

        Ok(self.chunk_text(&name, &raw_text, window_size, overlap))
    }

    /// Chunk already-extracted document text into overlapping token windows.
    ///
    /// Each non-empty window becomes one [`DocumentChunk`] labeled with the
    /// last section heading whose line precedes the window's approximate
    /// starting line.
    #[inline]
    pub fn chunk_text(
        &self,
        document_id: &str,
        raw_text: &str,
        window_size: usize,
        overlap: usize,
    ) -> Vec<DocumentChunk> {
        let lines: Vec<&str> = raw_text
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let markers = self.scan_section_markers(&lines);
        let joined = lines.join("\n");
        let tokens = self.bpe.encode_ordinary(&joined);

        let mut chunks = Vec::new();
        // Line numbers are approximated by counting newlines in the decoded
        // prefix. The count is carried incrementally across windows: each
        // stride delta is decoded once instead of re-decoding the whole
        // prefix per window.
        let mut prefix_newlines = 0usize;
        let mut counted_upto = 0usize;

        for (start, end) in window_spans(tokens.len(), window_size, overlap) {
            if start > counted_upto {
                match self.bpe.decode(tokens[counted_upto..start].to_vec()) {
                    Ok(delta) => {
                        prefix_newlines += delta.matches('\n').count();
                        counted_upto = start;
                    }
                    // The stride boundary split a multi-byte character; fold
                    // this span into the next delta.
                    Err(_) => {}
                }
            }

            let text = match self.bpe.decode(tokens[start..end].to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "Skipping undecodable token window [{}, {}) in {}: {}",
                        start, end, document_id, e
                    );
                    continue;
                }
            };

            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            chunks.push(DocumentChunk {
                file: document_id.to_owned(),
                section: section_for_prefix(&markers, prefix_newlines).to_owned(),
                text: text.to_owned(),
            });
        }

        chunks
    }

    fn scan_section_markers(&self, lines: &[&str]) -> Vec<SectionMarker> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(self.heading_pattern.is_match(line), Ok(true)))
            .map(|(i, line)| SectionMarker {
                line: i,
                heading: (*line).to_owned(),
            })
            .collect()
    }
}

/// Window start/end offsets for a token sequence of `token_count` tokens.
///
/// Windows advance by `window_size - overlap`; consecutive windows share
/// `overlap` tokens and the final window may be shorter than `window_size`.
/// A trailing window that would consist solely of the previous window's
/// overlap tail is not emitted.
fn window_spans(token_count: usize, window_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    debug_assert!(overlap < window_size);

    if token_count == 0 {
        return Vec::new();
    }

    let stride = window_size - overlap;
    let bound = token_count.saturating_sub(overlap).max(1);

    let mut spans = Vec::new();
    let mut start = 0;
    while start < bound {
        spans.push((start, (start + window_size).min(token_count)));
        start += stride;
    }

    spans
}

/// The last marker at or before `prefix_lines`, or the default label when
/// no heading precedes the window.
fn section_for_prefix(markers: &[SectionMarker], prefix_lines: usize) -> &str {
    markers
        .iter()
        .take_while(|marker| marker.line <= prefix_lines)
        .last()
        .map_or(DEFAULT_SECTION, |marker| marker.heading.as_str())
}
