//! Sentence-aware text chunking for document and transcript bodies.

/// Split text into sentences. A sentence ends at `.`, `!` or `?` followed by
/// whitespace, or at a blank line.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let next = chars.peek().map(|(_, n)| *n);
        let boundary = match c {
            '.' | '!' | '?' => next.map_or(true, char::is_whitespace),
            '\n' => next == Some('\n'),
            _ => false,
        };
        if boundary {
            let end = idx + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut a string into pieces of at most `size` characters.
fn hard_split(s: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(size)
        .map(|piece| piece.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Pack sentences into windows of at most `chunk_size` characters.
///
/// Each new window starts with the trailing sentences of the previous one, up
/// to `overlap` characters. Sentences longer than a window are split hard.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let pieces: Vec<String> = split_sentences(text)
        .into_iter()
        .flat_map(|s| {
            if char_len(s) > chunk_size {
                hard_split(s, chunk_size)
            } else {
                vec![s.to_string()]
            }
        })
        .collect();

    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0;

    for piece in &pieces {
        let piece_len = char_len(piece);
        let joined_len = |len: usize, empty: bool| if empty { len } else { len + 1 };

        if !window.is_empty() && window_len + 1 + piece_len > chunk_size {
            chunks.push(window.join(" "));

            let mut carried: Vec<&str> = Vec::new();
            let mut carried_len = 0;
            for prev in window.iter().rev().copied() {
                let add = joined_len(char_len(prev), carried.is_empty());
                if carried_len + add > overlap {
                    break;
                }
                carried_len += add;
                carried.push(prev);
            }
            carried.reverse();

            // Drop the overlap if the next sentence would not fit beside it.
            if !carried.is_empty() && carried_len + 1 + piece_len > chunk_size {
                carried.clear();
                carried_len = 0;
            }
            window = carried;
            window_len = carried_len;
        }

        window_len += joined_len(piece_len, window.is_empty());
        window.push(piece);
    }

    if !window.is_empty() {
        chunks.push(window.join(" "));
    }
    chunks
}

/// Natural key of the `n`th chunk of a source document.
pub fn chunk_id(source_id: &str, n: usize) -> String {
    format!("{}_chunk_{}", source_id, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("Revenue rose 12%. Margins held! Guidance?  Unchanged");
        assert_eq!(
            s,
            vec!["Revenue rose 12%.", "Margins held!", "Guidance?", "Unchanged"]
        );
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let s = split_sentences("EPS was 3.45 this quarter. Next.");
        assert_eq!(s, vec!["EPS was 3.45 this quarter.", "Next."]);
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("   \n\n ", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("One. Two. Three.", 1000, 200);
        assert_eq!(chunks, vec!["One. Two. Three."]);
    }

    #[test]
    fn test_windows_respect_size_and_overlap() {
        let sentence = "This sentence is exactly forty chars ok.";
        assert_eq!(sentence.len(), 40);
        let text = vec![sentence; 10].join(" ");

        let chunks = chunk_text(&text, 100, 45);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "{}", chunk);
        }
        // Every window after the first starts with the last sentence of the
        // previous one.
        for pair in chunks.windows(2) {
            assert!(pair[0].ends_with(sentence));
            assert!(pair[1].starts_with(sentence));
        }
    }

    #[test]
    fn test_long_sentence_is_hard_split() {
        let text = "x".repeat(2500);
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "₹ crore figures rose. ".repeat(50);
        let chunks = chunk_text(&text, 64, 16);
        assert!(chunks.iter().all(|c| c.chars().count() <= 64));
    }

    #[test]
    fn test_chunk_id() {
        let id = chunk_id("AAPL_annual_report_20240201", 3);
        assert_eq!(id, "AAPL_annual_report_20240201_chunk_3");
    }
}
