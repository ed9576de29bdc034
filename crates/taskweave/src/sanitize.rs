//! Helpers for keeping message bodies out of tracing span attributes.
//!
//! Event text is user content (chat messages, email bodies). Spans and log
//! lines carry a short preview or a hash instead of the full text.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Returns at most `max_chars` characters of `text`, on a char boundary,
/// with an ellipsis when something was cut. Newlines are flattened.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let flat = flat.trim();

    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat.to_string(),
    }
}

/// Truncates to `max_chars` characters without adding anything.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Returns a short deterministic hash of a text for correlation without
/// exposing the content.
pub fn hash_text(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_text_unchanged() {
        assert_eq!(preview("fix the bug", 40), "fix the bug");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 4), "héll…");
    }

    #[test]
    fn test_preview_flattens_newlines() {
        assert_eq!(preview("line one\nline two", 100), "line one line two");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn test_hash_text_deterministic() {
        let h1 = hash_text("We need to fix the login bug");
        let h2 = hash_text("We need to fix the login bug");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
        assert_ne!(h1, hash_text("something else"));
    }
}
