//! Overlapping fixed-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters.
//! Each window starts `chunk_size - overlap` characters after the previous
//! one, so consecutive chunks share exactly `overlap` characters and a
//! concept straddling a boundary survives intact in at least one chunk.
//!
//! Sizes are measured in `char`s, never bytes, so multi-byte text is never
//! split inside a code point.
//!
//! Each chunk carries a SHA-256 hash of its text, used to compare index
//! contents across rebuilds.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split text into overlapping windows.
///
/// Returns an empty vec for empty or whitespace-only input and at least one
/// chunk otherwise. Positions are contiguous starting at 0.
///
/// Callers must ensure `overlap < chunk_size` (enforced by
/// [`Config::validate`](crate::config::Config::validate)).
pub fn chunk_text(source: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut position: i64 = 0;

    loop {
        let end = (start + chunk_size).min(total);
        let piece: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(source, position, &piece));
        position += 1;

        if end >= total {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(source: &str, position: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());

    Chunk {
        source: source.to_string(),
        position,
        text: text.to_string(),
        hash: hex::encode(hasher.finalize()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(chunk_text("doc", "", 800, 150).is_empty());
        assert!(chunk_text("doc", "   \n\t ", 800, 150).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc", "Hello, world!", 800, 150);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source, "doc");
    }

    #[test]
    fn test_exact_size_single_chunk() {
        let chunks = chunk_text("doc", &sample(800), 800, 150);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunk_count_matches_formula() {
        for len in [801usize, 1000, 1450, 1451, 3000, 10_007] {
            let chunks = chunk_text("doc", &sample(len), 800, 150);
            let expected = (len - 150).div_ceil(800 - 150);
            assert_eq!(chunks.len(), expected, "len={}", len);
        }
    }

    #[test]
    fn test_chunks_bounded_and_overlap_exact() {
        let text = sample(5000);
        let chunks = chunk_text("doc", &text, 800, 150);
        for c in &chunks {
            assert!(c.text.chars().count() <= 800);
        }
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            let tail: String = prev[prev.len() - 150..].iter().collect();
            let head: String = next[..150].iter().collect();
            assert_eq!(tail, head);
        }
        // The final chunk reaches the end of the text.
        assert!(text.ends_with(&chunks.last().unwrap().text));
    }

    #[test]
    fn test_positions_contiguous() {
        let chunks = chunk_text("doc", &sample(4000), 800, 150);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i as i64);
        }
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "é".repeat(1000);
        let chunks = chunk_text("doc", &text, 800, 150);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 800);
        assert_eq!(chunks[1].text.chars().count(), 350);
    }

    #[test]
    fn test_boundary_phrase_survives() {
        // Place a phrase across the first window boundary.
        let mut text = sample(780);
        text.push_str("Django expert");
        text.push_str(&sample(500));
        let chunks = chunk_text("doc", &text, 800, 150);
        assert!(chunks.iter().any(|c| c.text.contains("Django expert")));
    }

    #[test]
    fn test_deterministic() {
        let text = sample(2500);
        let c1 = chunk_text("doc", &text, 800, 150);
        let c2 = chunk_text("doc", &text, 800, 150);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
        }
    }
}
