use super::Document;
use crate::{Error, Result};

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A contiguous span of a source document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    pub source: String,
    /// Position of the chunk within its document.
    pub index: usize,
    /// Offset of the first character within the document, in characters.
    pub start: usize,
    pub text: String,
}

/// Splits documents into windows of at most `chunk_size` characters, each one
/// repeating the last `overlap` characters of its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl TextSplitter {
    /// # Errors
    ///
    /// Returns [`Error::InvalidChunking`] if `chunk_size` is zero or not larger than `overlap`.
    pub const fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::InvalidChunking {
                size: chunk_size,
                overlap,
            });
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    #[must_use]
    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|document| {
                self.split_text(&document.content)
                    .into_iter()
                    .enumerate()
                    .map(|(index, (start, text))| Chunk {
                        source: document.source.clone(),
                        index,
                        start,
                        text,
                    })
            })
            .collect()
    }

    /// Returns `(start, text)` pairs. A window ends right after the last separator that
    /// still leaves it longer than the overlap, or at the hard size limit otherwise.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let hard_end = (start + self.chunk_size).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                self.break_point(&chars, start, hard_end)
            };

            pieces.push((start, chars[start..end].iter().collect()));

            if end == chars.len() {
                break;
            }

            start = end - self.overlap;
        }

        pieces
    }

    fn break_point(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_end = start + self.overlap + 1;

        for separator in SEPARATORS {
            let separator: Vec<char> = separator.chars().collect();
            let Some(mut pos) = hard_end.checked_sub(separator.len()) else {
                continue;
            };

            while pos >= start && pos + separator.len() >= min_end {
                if chars[pos..pos + separator.len()] == separator[..] {
                    return pos + separator.len();
                }

                if pos == 0 {
                    break;
                }
                pos -= 1;
            }
        }

        hard_end
    }
}
