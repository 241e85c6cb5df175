//! Recovering a JSON document from model output that is almost JSON.
//!
//! Candidates are tried in order: the raw text, the text without a markdown
//! fence, every balanced object/array inside either, and an outer wrapper
//! peeled off. Each candidate is also retried after light repair (trailing
//! commas, smart quotes).

use serde::de::DeserializeOwned;

const MAX_CANDIDATES_PER_SOURCE: usize = 4;
const MAX_PREVIEW_LEN: usize = 200;

fn push_unique(candidates: &mut Vec<String>, candidate: impl Into<String>) {
    let candidate = candidate.into();
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return;
    }
    if !candidates.iter().any(|existing| existing == trimmed) {
        candidates.push(trimmed.to_string());
    }
}

pub fn strip_markdown_fences(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let without_open = trimmed.strip_prefix("```")?;
    let body = match without_open.find('\n') {
        Some(newline) => &without_open[newline + 1..],
        None => without_open,
    };
    let end = body.rfind("```").unwrap_or(body.len());
    Some(body[..end].trim().to_string())
}

/// `{ {..} }` or `[ [..] ]` style double wrapping.
fn unwrap_outer_wrapper(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.len() < 3 {
        return None;
    }
    let inner = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        &trimmed[1..trimmed.len() - 1]
    } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        return None;
    };
    let head = inner.trim_start();
    (head.starts_with('{') || head.starts_with('[')).then(|| inner.trim().to_string())
}

/// The balanced object or array starting at byte `start`, string-aware.
pub fn balanced_json_at(content: &str, start: usize) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&content[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn balanced_candidates(content: &str, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    for (idx, ch) in content.char_indices() {
        if out.len() >= limit {
            break;
        }
        if ch == '{' || ch == '[' {
            if let Some(found) = balanced_json_at(content, idx) {
                push_unique(&mut out, found);
            }
        }
    }
    out
}

/// Trailing commas and typographic quotes, the two most common defects.
pub fn repair_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = json
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();
    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

fn preview(content: &str) -> &str {
    match content.char_indices().nth(MAX_PREVIEW_LEN) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Parse `content` as `T`, salvaging mildly malformed model output.
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> anyhow::Result<T> {
    let mut candidates = Vec::new();
    push_unique(&mut candidates, content);
    if let Some(stripped) = strip_markdown_fences(content) {
        push_unique(&mut candidates, stripped);
    }

    let mut idx = 0;
    while idx < candidates.len() {
        let current = candidates[idx].clone();
        for found in balanced_candidates(&current, MAX_CANDIDATES_PER_SOURCE) {
            push_unique(&mut candidates, found);
        }
        if let Some(unwrapped) = unwrap_outer_wrapper(&current) {
            push_unique(&mut candidates, unwrapped);
        }
        idx += 1;
    }

    let mut last_err = None;
    for candidate in &candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err.to_string()),
        }
        let repaired = repair_json(candidate);
        if repaired != *candidate {
            if let Ok(value) = serde_json::from_str::<T>(&repaired) {
                tracing::debug!("parsed structured output after repair");
                return Ok(value);
            }
        }
    }

    Err(anyhow::anyhow!(
        "Failed to parse structured response: {}\nContent: {}",
        last_err.unwrap_or_else(|| "no JSON found".to_string()),
        preview(content)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Knob {
        name: String,
        max: f32,
    }

    #[test]
    fn test_plain_json() {
        let knob: Knob = parse_structured(r#"{"name": "drive", "max": 20}"#).unwrap();
        assert_eq!(knob, Knob { name: "drive".into(), max: 20.0 });
    }

    #[test]
    fn test_fenced_json_with_chatter() {
        let raw = "Here is the plugin:\n```json\n{\"name\": \"mix\", \"max\": 1}\n```\nEnjoy!";
        let knob: Knob = parse_structured(raw).unwrap();
        assert_eq!(knob.name, "mix");
    }

    #[test]
    fn test_trailing_comma_and_smart_quotes() {
        let raw = "{\u{201C}name\u{201D}: \"a, b\", \"max\": 2,\n}";
        let knob: Knob = parse_structured(raw).unwrap();
        assert_eq!(knob.name, "a, b");
        assert_eq!(knob.max, 2.0);
    }

    #[test]
    fn test_repair_keeps_commas_inside_strings() {
        assert_eq!(repair_json(r#"{"a": ",}"}"#), r#"{"a": ",}"}"#);
        assert_eq!(repair_json("[1, 2, ]"), "[1, 2 ]");
    }

    #[test]
    fn test_balanced_extraction_respects_strings() {
        let text = r#"x {"name": "}{", "max": 1} y"#;
        assert_eq!(balanced_json_at(text, 2), Some(r#"{"name": "}{", "max": 1}"#));
    }

    #[test]
    fn test_unparseable_reports_preview() {
        let err = parse_structured::<Knob>("no json at all").unwrap_err();
        assert!(err.to_string().contains("Failed to parse structured response"));
    }
}
