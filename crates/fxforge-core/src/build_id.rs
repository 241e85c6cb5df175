//! Per-push plugin code written into the build configuration.
//!
//! Hosts cache plugins by their four-character code, so every push carries a
//! fresh one.

use crate::lexer::cached_regex;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildIdError {
    #[error("build configuration has no PLUGIN_CODE entry")]
    MissingEntry,
    #[error("'{0}' is not a valid plugin code (one uppercase letter then three lowercase letters or digits)")]
    InvalidCode(String),
}

const TAIL_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn plugin_code_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?m)^([ \t]*PLUGIN_CODE[ \t]+)([^\s)]+)")
}

pub fn is_valid_plugin_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 4
        && bytes[0].is_ascii_uppercase()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// A fresh code: one uppercase letter, then three lowercase letters or digits.
pub fn generate_plugin_code<R: Rng>(rng: &mut R) -> String {
    let mut code = String::with_capacity(4);
    code.push(char::from(b'A' + rng.gen_range(0..26u8)));
    for _ in 0..3 {
        code.push(char::from(TAIL_CHARS[rng.gen_range(0..TAIL_CHARS.len())]));
    }
    code
}

/// Rewrite the `PLUGIN_CODE` entry of a CMake file. Other codes such as
/// `PLUGIN_MANUFACTURER_CODE` are left alone.
pub fn update_build_identifier(content: &str, code: &str) -> Result<String, BuildIdError> {
    if !is_valid_plugin_code(code) {
        return Err(BuildIdError::InvalidCode(code.to_string()));
    }
    let re = plugin_code_re().ok_or(BuildIdError::MissingEntry)?;
    if !re.is_match(content) {
        return Err(BuildIdError::MissingEntry);
    }
    Ok(re
        .replace(content, |caps: &regex::Captures<'_>| format!("{}{code}", &caps[1]))
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CMAKE: &str = "juce_add_plugin(FxForge\n    COMPANY_NAME \"FxForge\"\n    PLUGIN_MANUFACTURER_CODE Fxfg\n    PLUGIN_CODE Abc1\n    FORMATS VST3 AU\n    PRODUCT_NAME \"FxForge\")\n";

    #[test]
    fn test_generated_codes_have_one_uppercase_letter() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_plugin_code(&mut rng);
            assert!(is_valid_plugin_code(&code), "{code}");
            assert_eq!(code.chars().filter(|c| c.is_ascii_uppercase()).count(), 1);
        }
    }

    #[test]
    fn test_update_replaces_only_plugin_code() {
        let updated = update_build_identifier(CMAKE, "Zq7x").unwrap();
        assert!(updated.contains("    PLUGIN_CODE Zq7x\n"));
        assert!(updated.contains("PLUGIN_MANUFACTURER_CODE Fxfg"));
        assert!(!updated.contains("Abc1"));
        assert_eq!(updated.len(), CMAKE.len());
    }

    #[test]
    fn test_update_at_end_of_call() {
        let cmake = "juce_add_plugin(X PLUGIN_MANUFACTURER_CODE Fxfg\nPLUGIN_CODE Abc1)";
        assert_eq!(
            update_build_identifier(cmake, "Kk00").unwrap(),
            "juce_add_plugin(X PLUGIN_MANUFACTURER_CODE Fxfg\nPLUGIN_CODE Kk00)"
        );
    }

    #[test]
    fn test_missing_entry_is_an_error() {
        let cmake = "juce_add_plugin(X\n    PLUGIN_MANUFACTURER_CODE Fxfg)\n";
        assert_eq!(update_build_identifier(cmake, "Abcd"), Err(BuildIdError::MissingEntry));
    }

    #[test]
    fn test_invalid_codes_are_rejected() {
        for bad in ["abcd", "ABCD", "Ab", "Ab-d", "Abcde"] {
            assert_eq!(
                update_build_identifier(CMAKE, bad),
                Err(BuildIdError::InvalidCode(bad.to_string()))
            );
        }
    }
}
