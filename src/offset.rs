//! Byte/character offset conversion.
//!
//! `regex` reports byte offsets; the output contract uses character
//! (Unicode scalar) offsets into the normalized text. [`CharIndex`] is built
//! once per text and answers conversions with a binary search.

/// Lookup table from byte offsets to character offsets for one text.
#[derive(Debug, Clone)]
pub struct CharIndex {
    /// Byte offset of every char boundary, including the end of the text.
    boundaries: Vec<usize>,
}

impl CharIndex {
    /// Index the char boundaries of `text`.
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Number of characters in the indexed text.
    pub fn char_len(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    /// Convert a byte offset to a character offset.
    ///
    /// Offsets that fall inside a multi-byte char resolve to that char's index.
    pub fn char_offset(&self, byte_offset: usize) -> usize {
        match self.boundaries.binary_search(&byte_offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        }
    }

    /// Convert a byte range to a half-open character range.
    pub fn char_span(&self, byte_start: usize, byte_end: usize) -> (usize, usize) {
        (self.char_offset(byte_start), self.char_offset(byte_end))
    }
}
