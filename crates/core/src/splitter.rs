pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 64;

/// Separator preference for hierarchical splitting: paragraph, line,
/// sentence terminator, word boundary. Character boundaries are the final
/// fallback when none of these fit the budget.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Splits `text` into overlapping chunks of roughly `chunk_size` characters.
/// Pure function of its arguments: the same text always yields the same
/// chunks. Non-empty input yields at least one chunk.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if chunk_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let pieces = split_by_separators(text, &SEPARATORS, chunk_size);
    merge_pieces(&pieces, chunk_size, chunk_overlap)
}

/// Breaks text into pieces no longer than `chunk_size`, preferring the
/// highest-priority separator that actually occurs. A piece that still
/// exceeds the budget is re-split with the remaining separators; character
/// windows are the last resort.
fn split_by_separators(text: &str, separators: &[&str], chunk_size: usize) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((separator, rest)) = separators.split_first() else {
        return char_windows(text, chunk_size);
    };

    if !text.contains(separator) {
        return split_by_separators(text, rest, chunk_size);
    }

    let parts: Vec<&str> = text.split(separator).collect();
    let last = parts.len().saturating_sub(1);
    let mut pieces = Vec::new();

    for (index, part) in parts.iter().enumerate() {
        let mut piece = (*part).to_string();
        if index < last {
            piece.push_str(separator);
        }
        if piece.trim().is_empty() {
            continue;
        }
        if piece.chars().count() > chunk_size {
            pieces.extend(split_by_separators(&piece, rest, chunk_size));
        } else {
            pieces.push(piece);
        }
    }

    pieces
}

fn char_windows(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|window| window.iter().collect())
        .collect()
}

/// Greedily packs pieces into chunks up to `chunk_size`, carrying the last
/// `chunk_overlap` characters of each finished chunk into the next one.
fn merge_pieces(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for piece in pieces {
        let piece_len = piece.chars().count();
        if current_len > 0 && current_len + piece_len > chunk_size {
            push_trimmed(&mut chunks, &current);
            current = tail_chars(&current, chunk_overlap);
            current_len = current.chars().count();
        }
        current.push_str(piece);
        current_len += piece_len;
    }

    push_trimmed(&mut chunks, &current);
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn tail_chars(text: &str, count: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(count);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_text("", 512, 64).is_empty());
        assert!(split_text("   \n\n  ", 512, 64).is_empty());
    }

    #[test]
    fn short_input_yields_one_chunk() {
        let chunks = split_text("Press F12 to open settings.", 512, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Press F12 to open settings.");
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "First paragraph about printers.\n\nSecond paragraph about scanners.\n\n"
            .repeat(20);
        assert_eq!(split_text(&text, 120, 20), split_text(&text, 120, 20));
    }

    #[test]
    fn every_word_of_the_input_survives() {
        let text = "Open the control panel.\nSelect the network tab. Enter the proxy address \
                    and press apply. Restart the workstation when prompted.\n\nContact the \
                    helpdesk if the connection still fails."
            .repeat(8);
        let chunks = split_text(&text, 100, 16);
        assert!(!chunks.is_empty());

        let merged = chunks.join(" ");
        for word in text.split_whitespace() {
            let token = word.trim_matches('.');
            assert!(merged.contains(token), "missing token: {token}");
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(80), "b".repeat(80));
        let chunks = split_text(&text, 100, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].chars().all(|c| c == 'a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = "word ".repeat(400);
        let chunks = split_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<String>();
            let tail: String = tail.chars().rev().collect();
            assert!(pair[1].starts_with(tail.trim_start()));
        }
    }

    #[test]
    fn unbroken_text_falls_back_to_character_windows() {
        let text = "x".repeat(1000);
        let chunks = split_text(&text, 100, 0);
        assert!(chunks.len() >= 10);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 100));
    }
}
