//! Character-offset string helpers shared across the pipeline.
//!
//! Worker-supplied spans and edit windows are expressed in character
//! offsets, never bytes, so paragraph slicing has to go through these
//! helpers instead of `&str` range indexing.

/// Number of characters (not bytes) in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Substring of `s` covering the character range `[start, end)`.
///
/// Out-of-range bounds are clamped; an inverted range yields an empty
/// string.
pub fn slice_chars(s: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    s.chars().skip(start).take(end - start).collect()
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Expand `[start, end)` to the sentence boundaries that contain it.
///
/// The returned window starts just after the previous sentence terminator
/// (skipping the whitespace that follows it) and ends after the terminator
/// run that closes the last touched sentence. A paragraph with no
/// terminators yields the whole paragraph.
pub fn sentence_window(paragraph: &str, start: usize, end: usize) -> (usize, usize) {
    let chars: Vec<char> = paragraph.chars().collect();
    let len = chars.len();
    let start = start.min(len);
    let end = end.min(len).max(start);

    let mut window_start = 0;
    let mut i = start;
    while i > 0 {
        if is_terminator(chars[i - 1]) {
            window_start = i;
            break;
        }
        i -= 1;
    }
    // Skip the whitespace run separating this sentence from the previous one.
    while window_start < start && chars[window_start].is_whitespace() {
        window_start += 1;
    }

    let mut window_end = len;
    let mut j = if end > start { end - 1 } else { end };
    while j < len {
        if is_terminator(chars[j]) {
            // Consume a trailing terminator run ("...", "?!").
            let mut k = j + 1;
            while k < len && is_terminator(chars[k]) {
                k += 1;
            }
            window_end = k;
            break;
        }
        j += 1;
    }

    (window_start, window_end)
}
