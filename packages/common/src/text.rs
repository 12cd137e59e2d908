//! Char-offset helpers. All text offsets in the store count Unicode scalar
//! values, never bytes.

/// Number of chars in `s`
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the char at `offset`, clamped to the end of the string
pub fn byte_index(s: &str, offset: usize) -> usize {
    s.char_indices()
        .nth(offset)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Split at a char offset (clamped)
pub fn split_at_char(s: &str, offset: usize) -> (&str, &str) {
    s.split_at(byte_index(s, offset))
}

/// Chars in `[start, end)` (clamped)
pub fn slice_chars(s: &str, start: usize, end: usize) -> &str {
    let start_byte = byte_index(s, start);
    let end_byte = byte_index(s, end.max(start));
    &s[start_byte..end_byte]
}

/// Replace chars in `[start, end)` with `replacement`
pub fn splice_chars(s: &str, start: usize, end: usize, replacement: &str) -> String {
    let start_byte = byte_index(s, start);
    let end_byte = byte_index(s, end.max(start));
    let mut out = String::with_capacity(s.len() + replacement.len());
    out.push_str(&s[..start_byte]);
    out.push_str(replacement);
    out.push_str(&s[end_byte..]);
    out
}
