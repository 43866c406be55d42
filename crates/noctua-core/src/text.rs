//! Shared text truncation helpers.
//!
//! All truncation in the pipeline goes through here so that captured model
//! output, findings and guardrail messages are cut at UTF-8 boundaries.

/// Largest index `<= index` that falls on a char boundary of `text`.
pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut boundary = index.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

/// Truncate `text` to at most `max` bytes, preserving UTF-8 boundaries.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    text[..floor_char_boundary(text, max)].to_string()
}

/// Truncate with a marker noting how much was dropped. Used for captured
/// stdout/stderr so the model sees that output was cut.
pub(crate) fn truncate_with_marker(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let kept = floor_char_boundary(text, max);
    format!(
        "{}\n[... truncated: {} chars -> {} chars ...]",
        &text[..kept],
        text.len(),
        kept
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_input_is_identity() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_utf8_boundaries() {
        // "é" is two bytes; cutting at byte 1 must back off to 0
        let s = "é";
        assert_eq!(truncate_chars(s, 1), "");
        assert_eq!(truncate_chars(s, 2), "é");
    }

    #[test]
    fn marker_reports_lengths() {
        let out = truncate_with_marker(&"x".repeat(100), 10);
        assert!(out.starts_with("xxxxxxxxxx"));
        assert!(out.contains("100 chars -> 10 chars"));
    }
}
