//! Overlapping, boundary-aware text chunker.
//!
//! Splits page text into [`Chunk`]s of at most `size` characters, where each
//! window after the first on a page starts exactly `overlap` characters
//! before the previous window ended. Sizes are measured in Unicode scalar
//! values, never bytes, so multi-byte text is never split inside a character.
//!
//! # Algorithm
//!
//! 1. Start the first window at character 0.
//! 2. If the rest of the page fits in `size` characters, emit it and stop.
//! 3. Otherwise pick the window end: the furthest position at most
//!    `start + size` that directly follows a separator, trying
//!    `"\n\n"`, `"\n"`, `". "` and `" "` in that order. Only ends that add new
//!    text beyond the overlap are eligible.
//! 4. If no separator qualifies, cut at exactly `start + size`.
//! 5. Start the next window at `end - overlap` and repeat.
//!
//! Dropping the first `overlap` characters of every window except the first
//! and concatenating the results reconstructs the page text exactly.
//!
//! # Example
//!
//! ```rust
//! use onboard_rag_core::chunk::split_text;
//!
//! let windows = split_text("Hello world.\n\nSecond paragraph.", 20, 4);
//! assert_eq!(windows[0], "Hello world.\n\n");
//! ```

use crate::error::{RagError, Result};
use crate::models::{Chunk, Page};

/// Boundaries tried when choosing where a window ends, strongest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Chunk every page, keeping source file name and page index on each chunk.
///
/// Chunks never span pages. `position` is contiguous across the whole call.
///
/// # Errors
///
/// [`RagError::InvalidChunking`] unless `0 <= overlap < size`.
pub fn chunk_pages(pages: &[Page], size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    validate(size, overlap)?;

    let mut chunks = Vec::new();
    for page in pages {
        for (index_in_page, text) in split_text(&page.text, size, overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(Chunk {
                text,
                source: page.source.clone(),
                page: page.page,
                position: chunks.len(),
                index_in_page,
            });
        }
    }
    Ok(chunks)
}

/// Check the chunking precondition `0 <= overlap < size`.
pub fn validate(size: usize, overlap: usize) -> Result<()> {
    if size == 0 || overlap >= size {
        return Err(RagError::InvalidChunking { size, overlap });
    }
    Ok(())
}

/// Split one text into overlapping windows.
///
/// Callers must uphold `overlap < size`; [`chunk_pages`] checks it. Empty
/// text yields no windows.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < size);

    // Byte offset of every character start, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;
    if char_len == 0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let limit = (start + size).min(char_len);
        let end = if limit == char_len {
            char_len
        } else {
            choose_end(text, &bounds, start + overlap, limit)
        };

        windows.push(text[bounds[start]..bounds[end]].to_string());

        if end == char_len {
            break;
        }
        start = end - overlap;
    }
    windows
}

/// Furthest character position in `(min_end, limit]` that follows a separator.
fn choose_end(text: &str, bounds: &[usize], min_end: usize, limit: usize) -> usize {
    for sep in SEPARATORS {
        let mut end = limit;
        while end > min_end {
            if text[..bounds[end]].ends_with(sep) {
                return end;
            }
            end -= 1;
        }
    }
    limit
}

/// Rebuild the original text from consecutive windows of one page.
pub fn reassemble(windows: &[String], overlap: usize) -> String {
    let mut out = String::new();
    for (i, w) in windows.iter().enumerate() {
        if i == 0 {
            out.push_str(w);
        } else {
            out.extend(w.chars().skip(overlap));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handbook_text() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Section {} explains how new hires request equipment and badges.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let windows = split_text("Hello, world!", 100, 10);
        assert_eq!(windows, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_text("", 100, 10).is_empty());
        let chunks = chunk_pages(&[Page::new("a.pdf", 0, "")], 100, 10).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let pages = vec![Page::new("a.pdf", 0, "text")];
        assert!(matches!(
            chunk_pages(&pages, 10, 10),
            Err(RagError::InvalidChunking { size: 10, overlap: 10 })
        ));
        assert!(chunk_pages(&pages, 0, 0).is_err());
        assert!(chunk_pages(&pages, 10, 9).is_ok());
    }

    #[test]
    fn test_length_bound_and_exact_overlap() {
        let text = handbook_text();
        for (size, overlap) in [(50, 0), (80, 10), (120, 40), (200, 199)] {
            let windows = split_text(&text, size, overlap);
            assert!(windows.len() > 1);
            for w in &windows {
                assert!(char_len(w) <= size, "window longer than {}: {:?}", size, w);
            }
            for pair in windows.windows(2) {
                let tail: String = pair[0]
                    .chars()
                    .skip(char_len(&pair[0]) - overlap)
                    .collect();
                let head: String = pair[1].chars().take(overlap).collect();
                assert_eq!(tail, head, "size={} overlap={}", size, overlap);
            }
        }
    }

    #[test]
    fn test_reassembly_is_exact() {
        let texts = [
            handbook_text(),
            "no separators at all in this one".repeat(20).replace(' ', ""),
            "Grüße aus Zürich. Überstunden werden erstattet.\nÄnderungen folgen. ".repeat(15),
            "   leading and trailing whitespace   \n\n\n\n  ".repeat(7),
        ];
        for text in &texts {
            for (size, overlap) in [(7, 0), (16, 3), (64, 32), (300, 50)] {
                let windows = split_text(text, size, overlap);
                assert_eq!(&reassemble(&windows, overlap), text);
            }
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "First paragraph here.\n\nSecond paragraph is here too.";
        let windows = split_text(text, 30, 5);
        assert_eq!(windows[0], "First paragraph here.\n\n");
        assert_eq!(reassemble(&windows, 5), text);
    }

    #[test]
    fn test_does_not_sever_words_when_spaces_exist() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi omicron pi rho sigma tau";
        let windows = split_text(text, 40, 10);
        for w in &windows[..windows.len() - 1] {
            assert!(w.ends_with(' '), "window cut mid-word: {:?}", w);
        }
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(25);
        let windows = split_text(&text, 10, 2);
        assert_eq!(windows[0].len(), 10);
        assert_eq!(windows[1].len(), 10);
        assert_eq!(reassemble(&windows, 2), text);
    }

    #[test]
    fn test_chunk_metadata() {
        let pages = vec![
            Page::new("benefits.pdf", 0, handbook_text()),
            Page::new("benefits.pdf", 1, "Short second page."),
            Page::new("handbook.pdf", 0, "Vacation policy is 20 days."),
        ];
        let chunks = chunk_pages(&pages, 100, 20).unwrap();

        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i, "position mismatch at {}", i);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.source, "handbook.pdf");
        assert_eq!(last.index_in_page, 0);
        assert_eq!(last.text, "Vacation policy is 20 days.");

        let second_page: Vec<_> = chunks.iter().filter(|c| c.page == 1).collect();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].index_in_page, 0);
        assert_eq!(second_page[0].source, "benefits.pdf");
    }

    #[test]
    fn test_deterministic() {
        let pages = vec![Page::new("a.pdf", 0, handbook_text())];
        let c1 = chunk_pages(&pages, 90, 15).unwrap();
        let c2 = chunk_pages(&pages, 90, 15).unwrap();
        assert_eq!(c1, c2);
    }
}
