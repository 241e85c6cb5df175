//! Advisory check that every member an implementation touches is declared in
//! a header.
//!
//! This is deliberately loose. It only runs on text and cannot see the
//! framework's own headers, so callers log the issues and push anyway; the
//! real compiler has the final word.

use crate::catalog::{is_builtin, is_keyword};
use crate::lexer::{cached_regex, identifier_spans, mask_literals_and_comments};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Framework names an implementation may use without a local declaration.
const FRAMEWORK_NAMES: &[&str] = &[
    "this",
    "AudioProcessor",
    "AudioProcessorEditor",
    "BusesProperties",
    "addParameter",
    "addAndMakeVisible",
    "createPluginFilter",
    "repaint",
    "jassert",
    "jassertfalse",
    "ignoreUnused",
    "startTimer",
    "startTimerHz",
    "stopTimer",
    "timerCallback",
    "addListener",
    "removeListener",
    "processBlock",
    "prepareToPlay",
    "releaseResources",
    "createEditor",
    "paint",
    "resized",
];

/// Keywords that can start a declaration (`const float x = ..`).
const TYPE_KEYWORDS: &[&str] = &[
    "auto", "int", "float", "double", "bool", "char", "void", "const", "static", "unsigned",
    "long", "short", "size_t",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub ok: bool,
    pub issues: Vec<String>,
    /// Set when one side was missing and nothing was compared.
    pub skipped: Option<String>,
}

fn method_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"\b([A-Za-z_]\w*)\s*\(")
}

fn member_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(
        &RE,
        r"\b([A-Za-z_]\w*)\s*(?:\[[^\]]*\]\s*)?(?:=\s*\{[^{}]*\}|=[^;{}]*|\{[^{}]*\})?\s*;",
    )
}

fn type_name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"\b(?:class|struct|enum(?:\s+class)?)\s+([A-Za-z_]\w*)")
}

fn alias_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"\busing\s+([A-Za-z_]\w*)\s*=")
}

fn enum_body_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"\benum\b(?:\s+class)?(?:\s+\w+)?(?:\s*:\s*[\w:]+)?\s*\{([^}]*)\}")
}

/// `type name` followed by `=`, `;`, `{`, `[`, `,`, `(` or `)`: locals,
/// loop variables and function parameters.
fn local_decl_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(
        &RE,
        r"\b([A-Za-z_][\w:]*(?:<[^<>;()]*>)?)[ \t*&]+([A-Za-z_]\w*)\s*[=;{\[,()]",
    )
}

fn capture_all(re: Option<&'static Regex>, text: &str, out: &mut BTreeSet<String>) {
    if let Some(re) = re {
        for caps in re.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                out.insert(name.as_str().to_string());
            }
        }
    }
}

/// Names an interface text declares.
pub fn declared_names(interface: &str) -> BTreeSet<String> {
    let masked = mask_literals_and_comments(interface);
    let mut names = BTreeSet::new();
    capture_all(method_re(), &masked, &mut names);
    capture_all(member_re(), &masked, &mut names);
    capture_all(type_name_re(), &masked, &mut names);
    capture_all(alias_re(), &masked, &mut names);
    if let Some(re) = enum_body_re() {
        for caps in re.captures_iter(&masked) {
            let Some(body) = caps.get(1) else { continue };
            for entry in body.as_str().split(',') {
                let name: String = entry
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                if !name.is_empty() {
                    names.insert(name);
                }
            }
        }
    }
    names
}

fn local_names(masked: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Some(re) = local_decl_re() else {
        return names;
    };
    for caps in re.captures_iter(masked) {
        let (Some(ty), Some(name)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let ty = ty.as_str();
        if is_keyword(ty) && !TYPE_KEYWORDS.contains(&ty) {
            continue;
        }
        names.insert(name.as_str().to_string());
    }
    names
}

fn is_accessor_name(name: &str) -> bool {
    ["get", "set"].iter().any(|prefix| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_uppercase())
    })
}

/// Names an implementation uses as members: `this->x`, `x->`, `x.`, `x(` and
/// assignment targets. Qualified (`a::x`) and accessed (`a.x`, `a->x`)
/// names are not the implementation's own.
fn used_names(masked: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for (range, name) in identifier_spans(masked) {
        let before = masked[..range.start].trim_end();
        let after = masked[range.end..].trim_start();

        let via_this = before.ends_with("this->") || before.ends_with("this ->");
        let qualified = before.ends_with('.')
            || before.ends_with("::")
            || before.ends_with("->")
            || before.ends_with('~');
        if qualified && !via_this {
            continue;
        }

        let member_like = after.starts_with("->")
            || after.starts_with('(')
            || (after.starts_with('.') && !after[1..].starts_with(|c: char| c.is_ascii_digit()));
        let assigned = (after.starts_with('=') && !after.starts_with("=="))
            || ["+=", "-=", "*=", "/="].iter().any(|op| after.starts_with(op));
        if via_this || member_like || assigned {
            names.insert(name.to_string());
        }
    }
    names
}

/// Compare what the implementations use against what the interfaces declare.
pub fn check_consistency(interfaces: &[&str], implementations: &[&str]) -> ConsistencyReport {
    if interfaces.is_empty() || implementations.is_empty() {
        let side = if interfaces.is_empty() { "interface" } else { "implementation" };
        return ConsistencyReport {
            ok: true,
            issues: Vec::new(),
            skipped: Some(format!("skipped: no {side} text to compare")),
        };
    }

    let mut declared = BTreeSet::new();
    for text in interfaces {
        declared.extend(declared_names(text));
    }

    let mut undeclared = BTreeSet::new();
    for text in implementations {
        let masked = mask_literals_and_comments(text);
        let locals = local_names(&masked);
        for name in used_names(&masked) {
            let known = declared.contains(&name)
                || locals.contains(&name)
                || is_keyword(&name)
                || is_builtin(&name)
                || FRAMEWORK_NAMES.contains(&name.as_str())
                || is_accessor_name(&name);
            if !known {
                undeclared.insert(name);
            }
        }
    }

    let issues: Vec<String> = undeclared
        .into_iter()
        .map(|name| format!("'{name}' is used but not declared in any header"))
        .collect();
    ConsistencyReport {
        ok: issues.is_empty(),
        issues,
        skipped: None,
    }
}
