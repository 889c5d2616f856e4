//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] — splits by character count with configurable overlap
//! - [`RecursiveChunker`] — prefers paragraph, line, sentence and word boundaries
//!
//! All sizes are counted in characters (Unicode scalar values), never bytes.
//! Every chunker upholds the same contract for non-empty text:
//!
//! - no chunk is longer than `chunk_size` characters,
//! - chunk `i + 1` starts at most `chunk_overlap` characters before chunk `i`
//!   ends, and never before chunk `i` starts,
//! - dropping the leading overlap of every chunk after the first and
//!   concatenating the rest yields the original text.
//!
//! Empty text yields no chunks.

use crate::config::RagConfig;
use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Separators tried by [`RecursiveChunker`], highest priority first.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A chunk of text with its character span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// The chunk text.
    pub text: String,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
}

/// A strategy for splitting document text into overlapping segments.
pub trait Chunker: Send + Sync {
    /// Split text into ordered, overlapping segments.
    ///
    /// Returns an empty `Vec` for empty text.
    fn split(&self, text: &str) -> Vec<TextSegment>;

    /// Split the text of `source_id` into [`Chunk`]s numbered from zero.
    fn chunk(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, segment)| Chunk {
                text: segment.text,
                source_id: source_id.to_string(),
                chunk_index,
            })
            .collect()
    }
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Byte offsets of every char boundary in `text`, including `text.len()`.
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect()
}

fn segment(text: &str, bounds: &[usize], start: usize, end: usize) -> TextSegment {
    TextSegment { text: text[bounds[start]..bounds[end]].to_string(), start, end }
}

/// Splits text into fixed-size windows by character count.
///
/// Every window except the last holds exactly `chunk_size` characters and
/// consecutive windows share exactly `chunk_overlap` characters.
///
/// # Example
///
/// ```rust,ignore
/// use doctalk_rag::{Chunker, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk("notes.txt", &text);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from an already validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self { chunk_size: config.chunk_size, chunk_overlap: config.chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn split(&self, text: &str) -> Vec<TextSegment> {
        let bounds = char_boundaries(text);
        let len = bounds.len() - 1;
        let mut segments = Vec::new();
        let mut start = 0;

        while start < len {
            let end = (start + self.chunk_size).min(len);
            segments.push(segment(text, &bounds, start, end));
            if end == len {
                break;
            }
            start = end - self.chunk_overlap;
        }

        segments
    }
}

/// Splits text at natural boundaries: paragraphs, lines, sentences, then words.
///
/// Within each `chunk_size` window the cut is placed right after the last
/// occurrence of the highest-priority separator (`"\n\n"`, `"\n"`, `". "`,
/// `"! "`, `"? "`, `" "`) that still leaves the chunk longer than
/// `chunk_overlap`. Without such a separator the window is cut hard at
/// `chunk_size`. The next chunk starts `chunk_overlap` characters before the
/// cut, moved forward to the next word start when one falls inside that
/// overlap.
///
/// # Example
///
/// ```rust,ignore
/// use doctalk_rag::{Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(512, 50)?;
/// let chunks = chunker.chunk("report.pdf", &text);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from an already validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self { chunk_size: config.chunk_size, chunk_overlap: config.chunk_overlap }
    }

    /// Find the cut position for the window `[start, hard_end)`.
    fn find_cut(&self, text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
        let window = &text[bounds[start]..bounds[hard_end]];
        for separator in SEPARATORS {
            if let Some(pos) = window.rfind(separator) {
                let cut = start + window[..pos + separator.len()].chars().count();
                // The last occurrence gives the longest chunk; if it is too
                // short, every earlier occurrence is too.
                if cut - start > self.chunk_overlap {
                    return cut;
                }
            }
        }
        hard_end
    }
}

/// First word start in `[from, to)`, if any.
fn next_word_start(chars: &[char], from: usize, to: usize) -> Option<usize> {
    (from.max(1)..to).find(|&p| chars[p - 1].is_whitespace() && !chars[p].is_whitespace())
}

impl Chunker for RecursiveChunker {
    fn split(&self, text: &str) -> Vec<TextSegment> {
        let bounds = char_boundaries(text);
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut segments = Vec::new();
        let mut start = 0;

        while start < len {
            let hard_end = (start + self.chunk_size).min(len);
            if hard_end == len {
                segments.push(segment(text, &bounds, start, len));
                break;
            }

            let end = self.find_cut(text, &bounds, start, hard_end);
            segments.push(segment(text, &bounds, start, end));

            let overlap_start = end - self.chunk_overlap;
            start = next_word_start(&chars, overlap_start, end).unwrap_or(overlap_start);
        }

        segments
    }
}
