//! Minimal C++ lexing helpers shared by the verification gate and the header
//! consistency checker.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Compile a pattern once per call site; `None` only if the pattern is invalid.
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn identifier_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"\b[A-Za-z_][A-Za-z0-9_]*\b")
}

/// Blank out string literals, char literals and comments.
///
/// The result has the same byte length as the input and keeps newlines, so
/// spans found in the masked text index straight into the original.
pub fn mask_literals_and_comments(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Str,
        Char,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();

    let blank = |out: &mut String, ch: char| {
        if ch == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
        }
    };

    while let Some(ch) = chars.next() {
        match state {
            State::Code => match ch {
                '"' => {
                    state = State::Str;
                    out.push(' ');
                }
                '\'' => {
                    state = State::Char;
                    out.push(' ');
                }
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                _ => out.push(ch),
            },
            State::Str | State::Char => {
                let closing = if state == State::Str { '"' } else { '\'' };
                if ch == '\\' {
                    out.push(' ');
                    if let Some(escaped) = chars.next() {
                        blank(&mut out, escaped);
                    }
                } else if ch == closing {
                    out.push(' ');
                    state = State::Code;
                } else if ch == '\n' {
                    // unterminated literal; resume scanning code on the next line
                    out.push('\n');
                    state = State::Code;
                } else {
                    blank(&mut out, ch);
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    out.push('\n');
                    state = State::Code;
                } else {
                    blank(&mut out, ch);
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    blank(&mut out, ch);
                }
            }
        }
    }
    out
}

/// Every identifier-shaped token with its byte span, in source order.
pub fn identifier_spans(masked: &str) -> Vec<(Range<usize>, &str)> {
    let Some(re) = identifier_re() else {
        return Vec::new();
    };
    re.find_iter(masked)
        .map(|m| (m.range(), m.as_str()))
        .collect()
}

/// Replace whole-token spans in one pass. Spans must not overlap.
pub fn replace_spans(source: &str, replacements: &[(Range<usize>, &str)]) -> String {
    let mut sorted: Vec<&(Range<usize>, &str)> = replacements.iter().collect();
    sorted.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (range, replacement) in sorted {
        out.push_str(&source[cursor..range.start]);
        out.push_str(replacement);
        cursor = range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_preserves_length_and_newlines() {
        let src = "float x = 1.0f; // gain here\nauto s = \"volume\";\n/* mix\n */ y";
        let masked = mask_literals_and_comments(src);
        assert_eq!(masked.len(), src.len());
        assert_eq!(masked.matches('\n').count(), src.matches('\n').count());
        assert!(!masked.contains("gain"));
        assert!(!masked.contains("volume"));
        assert!(!masked.contains("mix"));
        assert!(masked.contains("float x"));
        assert!(masked.ends_with(" y"));
    }

    #[test]
    fn test_mask_handles_escapes_and_chars() {
        let src = r#"s = "a \" b"; c = '\''; d"#;
        let masked = mask_literals_and_comments(src);
        assert_eq!(masked.len(), src.len());
        let ids: Vec<&str> = identifier_spans(&masked).into_iter().map(|(_, t)| t).collect();
        assert_eq!(ids, vec!["s", "c", "d"]);
    }

    #[test]
    fn test_mask_non_ascii_inside_comment() {
        let src = "a // gain → drive\nb";
        let masked = mask_literals_and_comments(src);
        assert_eq!(masked.len(), src.len());
        let ids: Vec<&str> = identifier_spans(&masked).into_iter().map(|(_, t)| t).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_identifier_spans_skip_numeric_suffixes() {
        let ids: Vec<&str> = identifier_spans("x = 1.0f * 2e5 + y_2;")
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(ids, vec!["x", "y_2"]);
    }

    #[test]
    fn test_replace_spans_in_single_pass() {
        let src = "a b a";
        let out = replace_spans(src, &[(0..1, "b"), (2..3, "c"), (4..5, "b")]);
        assert_eq!(out, "b c b");
    }
}
