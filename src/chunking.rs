use crate::document::Document;
use anyhow::Result;
use log::debug;

/// Default maximum chunk length, in characters
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
/// Default number of characters shared by consecutive chunks
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separators tried in order when looking for a chunk boundary
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Estimated token count for this chunk
    pub token_count: usize,
    /// Source of the document this chunk belongs to
    pub document_id: String,
    /// Page of the source document, if paginated
    pub page: Option<usize>,
    /// Position of this chunk in the overall chunk sequence
    pub chunk_index: usize,
    /// Starting character position of this chunk in its document
    pub start_position: usize,
}

/// A character range of a split text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First character of the span
    pub start: usize,
    /// One past the last character of the span
    pub end: usize,
}

/// Splits documents into overlapping chunks of bounded length.
///
/// Boundaries prefer paragraph breaks, then line breaks, then spaces, and fall
/// back to a hard cut. Consecutive chunks always share exactly `chunk_overlap`
/// characters, so dropping that prefix from every chunk but the first and
/// concatenating the rest yields the original text.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(anyhow::anyhow!("Chunk size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(anyhow::anyhow!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            ));
        }
        Ok(TextSplitter {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every document, numbering chunks across the whole sequence
    pub fn split_documents(&self, documents: &[Document]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();

        for document in documents {
            let content = &document.content;
            let offsets = char_offsets(content);

            for span in self.split_text(content) {
                let text = content[offsets[span.start]..offsets[span.end]].to_string();
                chunks.push(TextChunk {
                    token_count: estimate_token_count(&text),
                    text,
                    document_id: document.metadata.source.clone(),
                    page: document.metadata.page,
                    chunk_index: chunks.len(),
                    start_position: span.start,
                });
            }
        }

        chunks
    }

    /// Compute chunk spans for a text, in characters
    pub fn split_text(&self, text: &str) -> Vec<Span> {
        let offsets = char_offsets(text);
        let total = offsets.len() - 1;

        let mut spans = Vec::new();
        let mut start = 0;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            if hard_end == total {
                spans.push(Span { start, end: total });
                break;
            }

            // The boundary must leave room to advance past the overlap
            let min_end = start + self.chunk_overlap + 1;
            let end = find_break(text, &offsets, min_end, hard_end).unwrap_or(hard_end);

            debug!("Chunk [{}, {}) ends at a separator: {}", start, end, end != hard_end);
            spans.push(Span { start, end });
            start = end - self.chunk_overlap;
        }

        spans
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        TextSplitter {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Byte offset of every character, plus the text length as a final entry
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Find the latest separator end within `[min_end, max_end]`, in characters
fn find_break(text: &str, offsets: &[usize], min_end: usize, max_end: usize) -> Option<usize> {
    if min_end > max_end {
        return None;
    }

    for separator in SEPARATORS {
        let sep_chars = separator.chars().count();
        let lo = min_end.saturating_sub(sep_chars);
        let window = &text[offsets[lo]..offsets[max_end]];

        if let Some(pos) = window.rfind(separator) {
            let end_byte = offsets[lo] + pos + separator.len();
            // Separators are ASCII, so the end always lands on a char boundary
            if let Ok(end) = offsets.binary_search(&end_byte) {
                if end >= min_end {
                    return Some(end);
                }
            }
        }
    }

    None
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}
