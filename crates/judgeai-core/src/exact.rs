//! Whitespace-insensitive equality used to skip the judge for identical texts.

/// Collapse runs of whitespace to a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when both texts are equal after [`normalize_whitespace`].
pub fn is_exact_match(actual: &str, expected: &str) -> bool {
    actual.split_whitespace().eq(expected.split_whitespace())
}
