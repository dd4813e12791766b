//! Fixed-size text chunking and lossless recombination.
//!
//! Chunk boundaries are chosen by character count alone, independent of word
//! or sentence boundaries, so recombination is exact concatenation in index
//! order with no separators added or removed.

/// A bounded contiguous slice of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

/// The per-chunk transform result, one-to-one with [`TextChunk`] by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedChunk {
    pub index: usize,
    pub text: String,
}

/// Split `text` into contiguous, non-overlapping chunks of at most
/// `max_chars` characters. Every chunk except possibly the last has exactly
/// `max_chars` characters; empty input yields zero chunks.
///
/// # Panics
///
/// Panics if `max_chars` is zero.
pub fn split(text: &str, max_chars: usize) -> Vec<TextChunk> {
    assert!(max_chars > 0, "chunk size must be positive");

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: std::mem::take(&mut current),
            });
            count = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(TextChunk {
            index: chunks.len(),
            text: current,
        });
    }

    chunks
}

/// Reassemble transformed chunks in original order. Completion order does not
/// matter; the chunk index is the join key.
pub fn recombine(mut chunks: Vec<RedactedChunk>) -> String {
    chunks.sort_by_key(|c| c.index);
    let mut out = String::with_capacity(chunks.iter().map(|c| c.text.len()).sum());
    for chunk in chunks {
        out.push_str(&chunk.text);
    }
    out
}
