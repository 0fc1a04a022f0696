//! Recursive-separator text chunker
//!
//! Splits transcript text into bounded, overlapping chunks. Each cut is
//! placed on the coarsest separator that keeps the chunk within `size`
//! characters (paragraph, line, sentence, word), falling back to a hard cut
//! at `size`. The next chunk starts exactly `overlap` characters before the
//! previous cut, so consecutive chunks always share `overlap` characters and
//! the original text is recovered by concatenating the first chunk with every
//! following chunk minus its leading `overlap` characters.
//!
//! Lengths and offsets are measured in `char`s, never bytes, so multi-byte
//! text is never split inside a code point.

use crate::error::{RagPersonaError, Result};

/// Separators tried from coarsest to finest.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// Split `text` into chunks of at most `size` characters sharing `overlap`
/// characters between neighbours.
///
/// Empty or whitespace-only input yields an empty vector.
///
/// # Errors
///
/// Returns `InvalidInput` unless `0 <= overlap < size`.
///
/// # Examples
///
/// ```
/// use ragpersona::rag::chunker::chunk;
///
/// let chunks = chunk("The quick brown fox jumps over the lazy dog", 20, 5).unwrap();
/// assert!(chunks.iter().all(|c| c.chars().count() <= 20));
/// ```
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    if size == 0 {
        return Err(RagPersonaError::InvalidInput("chunk size must be greater than 0".into()).into());
    }
    if overlap >= size {
        return Err(RagPersonaError::InvalidInput(format!(
            "chunk overlap ({}) must be less than chunk size ({})",
            overlap, size
        ))
        .into());
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let separators: Vec<Vec<char>> = SEPARATORS.iter().map(|s| s.chars().collect()).collect();

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        if chars.len() - start <= size {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let limit = start + size;
        // The cut must land after start + overlap so the next start advances.
        let end = find_cut(&chars, &separators, start, start + overlap, limit).unwrap_or(limit);

        chunks.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    tracing::debug!(
        chunks = chunks.len(),
        chars = chars.len(),
        size,
        overlap,
        "Chunked text"
    );

    Ok(chunks)
}

/// Find the furthest cut point in `(floor, limit]` that ends on a separator
/// lying entirely inside `[start, limit)`, trying coarse separators first.
fn find_cut(
    chars: &[char],
    separators: &[Vec<char>],
    start: usize,
    floor: usize,
    limit: usize,
) -> Option<usize> {
    separators.iter().find_map(|sep| {
        (floor + 1..=limit)
            .rev()
            .find(|&end| end >= start + sep.len() && chars[end - sep.len()..end] == sep[..])
    })
}

/// Rebuild the source text from chunks produced with the given overlap.
pub fn reconstruct(chunks: &[String], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(chunk);
        } else {
            text.extend(chunk.chars().skip(overlap));
        }
    }
    text
}
