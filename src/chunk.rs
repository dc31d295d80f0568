//! Overlapping, boundary-preferring text chunker.
//!
//! Splits extracted document text into windows of at most `chunk_size`
//! characters. Each window after the first starts with the trailing
//! `overlap` characters of the previous one, so context that straddles a
//! cut is visible from both sides.
//!
//! # Algorithm
//!
//! 1. Measure length in `char`s so multi-byte text is never split inside a
//!    character.
//! 2. From the current start, look at the window `[start, start + chunk_size]`.
//! 3. Pick the latest natural cut inside the back half of the window, trying
//!    in order: paragraph break (`\n\n`), line break, sentence end
//!    (`.`/`!`/`?` followed by whitespace), any whitespace.
//! 4. With no natural cut available, hard-cut at `start + chunk_size`.
//! 5. The next window starts `overlap` characters before the cut.
//!
//! Chunks are never trimmed, so dropping the first `overlap` characters of
//! every chunk after the first and concatenating reproduces the input.
//!
//! # Example
//!
//! ```rust
//! use suriel::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 1000, 100).unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```

use crate::error::{RagError, Result};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Returns an empty list for empty or whitespace-only input.
///
/// # Errors
///
/// [`RagError::InvalidInput`] when `chunk_size` is zero or `overlap` is not
/// strictly smaller than `chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(RagError::InvalidInput("chunk size must be > 0".into()));
    }
    if overlap >= chunk_size {
        return Err(RagError::InvalidInput(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, chunk_size
        )));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        if chars.len() - start <= chunk_size {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let hard_end = start + chunk_size;
        // The cut must land past the overlap so every step makes progress.
        let min_end = (start + overlap + 1).max(start + chunk_size / 2);
        let end = find_natural_cut(&chars, min_end, hard_end).unwrap_or(hard_end);

        chunks.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    Ok(chunks)
}

/// Find the latest cut position in `[lo, hi]`, by boundary priority.
///
/// A cut at `p` means the chunk ends with `chars[p - 1]`.
fn find_natural_cut(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let is_paragraph = |p: usize| p >= 2 && chars[p - 2] == '\n' && chars[p - 1] == '\n';
    let is_line = |p: usize| chars[p - 1] == '\n';
    let is_sentence = |p: usize| {
        p >= 2 && chars[p - 1].is_whitespace() && matches!(chars[p - 2], '.' | '!' | '?')
    };
    let is_space = |p: usize| chars[p - 1].is_whitespace();

    let rules: [&dyn Fn(usize) -> bool; 4] = [&is_paragraph, &is_line, &is_sentence, &is_space];
    rules
        .iter()
        .find_map(|rule| (lo..=hi).rev().find(|&p| p >= 1 && rule(p)))
}
