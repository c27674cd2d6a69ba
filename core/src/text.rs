//! Text helpers shared by the resolver: checker normalization, offset to
//! line/column translation and word lookup at a cursor.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::Position;

/// Punctuation the checker ignores. Every member is a single ASCII byte, so
/// replacing it with a space keeps byte offsets and columns aligned with the
/// original text.
static CHECKER_PUNCTUATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[`"!#$%&()*+,./:;<=>?@\[\]\\^_{|}]"#).expect("static regex")
});

/// Replace checker-ignored punctuation with spaces.
pub fn normalize_for_checker(text: &str) -> String {
    CHECKER_PUNCTUATION_RE.replace_all(text, " ").into_owned()
}

/// Translate a byte offset into a zero-based line and UTF-16 column.
///
/// Offsets past the end clamp to the end of the text; offsets inside a
/// multi-byte character snap back to its start.
pub fn to_line_column(text: &str, offset: usize) -> Position {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let prefix = &text[..offset];
    let line = prefix.bytes().filter(|b| *b == b'\n').count() as u32;
    let line_start = prefix.rfind('\n').map_or(0, |idx| idx + 1);
    let character = text[line_start..offset].encode_utf16().count() as u32;
    Position { line, character }
}

/// Inverse of [`to_line_column`]. Returns `None` when the line does not
/// exist, the column runs past the end of the line, or it splits a
/// surrogate pair.
pub fn from_line_column(text: &str, pos: Position) -> Option<usize> {
    let mut line_start = 0usize;
    for _ in 0..pos.line {
        line_start += text[line_start..].find('\n')? + 1;
    }
    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |idx| line_start + idx);

    let mut units = 0u32;
    for (idx, ch) in text[line_start..line_end].char_indices() {
        if units == pos.character {
            return Some(line_start + idx);
        }
        units += ch.len_utf16() as u32;
        if units > pos.character {
            return None;
        }
    }
    (units == pos.character).then_some(line_end)
}

/// Word under (or immediately before) the byte offset, using Unicode word
/// boundaries.
pub fn word_at(text: &str, offset: usize) -> Option<(Range<usize>, &str)> {
    let mut previous: Option<(usize, &str)> = None;

    for (start, segment) in text.split_word_bound_indices() {
        let end = start + segment.len();
        let is_word = segment.chars().any(char::is_alphanumeric);
        if (start..end).contains(&offset) {
            if is_word {
                return Some((start..end, segment));
            }
            break;
        }
        previous = is_word.then_some((start, segment));
    }

    previous
        .filter(|(start, word)| start + word.len() == offset)
        .map(|(start, word)| (start..start + word.len(), word))
}
