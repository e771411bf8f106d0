
use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }

        Ok(())
    }
}

/// A contiguous span of the source document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position of this chunk in the document
    pub index: usize,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// The chunk text, exactly `document[start..end]`
    pub text: &'a str,
}

impl Chunk<'_> {
    /// Length of the chunk in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Boundary kinds, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Clause,
    Whitespace,
}

const BOUNDARY_PRIORITY: [Boundary; 5] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Clause,
    Boundary::Whitespace,
];

const CLAUSE_PUNCTUATION: [char; 7] = ['；', ';', '，', ',', '、', '：', ':'];

impl Boundary {
    /// Byte offset just past the latest boundary of this kind in `text[start..limit]`
    fn latest_cut(self, text: &str, start: usize, limit: usize) -> Option<usize> {
        let window = text.get(start..limit)?;

        let found = match self {
            Self::Paragraph => window.rfind("\n\n").map(|i| i + 2),
            Self::Line => window.rfind('\n').map(|i| i + 1),
            Self::Sentence => last_char_end(window, |offset, c| match c {
                '。' | '！' | '？' => true,
                '.' | '!' | '?' => followed_by_whitespace(text, start + offset + c.len_utf8()),
                _ => false,
            }),
            Self::Clause => last_char_end(window, |_, c| CLAUSE_PUNCTUATION.contains(&c)),
            Self::Whitespace => last_char_end(window, |_, c| c.is_whitespace()),
        };

        found.map(|offset| start + offset)
    }
}

fn last_char_end(window: &str, mut is_boundary: impl FnMut(usize, char) -> bool) -> Option<usize> {
    window
        .char_indices()
        .rev()
        .find(|&(offset, c)| is_boundary(offset, c))
        .map(|(offset, c)| offset + c.len_utf8())
}

fn followed_by_whitespace(text: &str, position: usize) -> bool {
    text.get(position..)
        .and_then(|rest| rest.chars().next())
        .is_none_or(char::is_whitespace)
}

/// Byte offset after the first `count` characters of `text`, or its length
fn offset_after_chars(text: &str, count: usize) -> usize {
    text.char_indices()
        .nth(count)
        .map_or(text.len(), |(offset, _)| offset)
}

/// Splits documents into overlapping chunks along natural boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        })
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily chunk `text`. Each call starts a fresh pass over the input.
    #[inline]
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            next_start: 0,
            index: 0,
            finished: text.is_empty(),
        }
    }

    /// Chunk `text` into owned strings
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chunks: Vec<String> = self
            .chunks(text)
            .map(|chunk| chunk.text.to_string())
            .collect();

        debug!(
            "Split {} characters into {} chunks (size {}, overlap {})",
            text.chars().count(),
            chunks.len(),
            self.chunk_size,
            self.overlap
        );

        chunks
    }
}

/// Iterator over the chunks of one document
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    next_start: usize,
    index: usize,
    finished: bool,
}

impl<'a> Chunks<'a> {
    fn emit(&mut self, start: usize, end: usize) -> Chunk<'a> {
        let chunk = Chunk {
            index: self.index,
            start,
            end,
            text: self.text.get(start..end).unwrap_or_default(),
        };
        self.index += 1;
        chunk
    }

    /// Start of the chunk following one that ends at `cut`
    fn overlap_start(&self, chunk_start: usize, cut: usize) -> usize {
        if self.overlap == 0 {
            return cut;
        }

        let head = self.text.get(..cut).unwrap_or_default();
        let window_start = head
            .char_indices()
            .rev()
            .nth(self.overlap - 1)
            .map_or(chunk_start, |(offset, _)| offset);

        // Prefer starting on a word inside the overlap window
        let mut previous = head
            .get(..window_start)
            .and_then(|before| before.chars().next_back());
        let window = head.get(window_start..).unwrap_or_default();
        for (offset, c) in window.char_indices() {
            if previous.is_some_and(char::is_whitespace) && !c.is_whitespace() {
                return window_start + offset;
            }
            previous = Some(c);
        }

        window_start
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    #[inline]
    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.finished {
            return None;
        }

        let start = self.next_start;
        let rest = self.text.get(start..)?;
        let limit = start + offset_after_chars(rest, self.chunk_size);

        if limit >= self.text.len() {
            self.finished = true;
            return Some(self.emit(start, self.text.len()));
        }

        // A boundary cut must leave more than `overlap` characters so the
        // next chunk starts strictly after this one
        let min_cut = start + offset_after_chars(rest, self.overlap + 1);
        let cut = BOUNDARY_PRIORITY
            .iter()
            .find_map(|boundary| {
                boundary
                    .latest_cut(self.text, start, limit)
                    .filter(|cut| *cut >= min_cut)
            })
            .unwrap_or(limit);

        self.next_start = self.overlap_start(start, cut);
        Some(self.emit(start, cut))
    }
}

impl FusedIterator for Chunks<'_> {}
