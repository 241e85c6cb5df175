use crate::repair::RepairContext;
use fxforge_core::juce::{EDITOR_CLASS, PROCESSOR_CLASS};
use fxforge_core::skeleton::Skeleton;

/// Build logs are clipped to their tail before they go into a prompt.
pub const MAX_ERROR_PROMPT_CHARS: usize = 4000;

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

const IDENTIFIER_RULES: &str = r#"IDENTIFIER RULES:
1. Use ONLY the exact names listed above.
2. Do NOT invent variations:
   - "mixParameter" (WRONG) -> "mixParam" (CORRECT)
   - "driveValue" (WRONG) -> "drive" (CORRECT)
   - "gainAmount" (WRONG) -> "gain" (CORRECT)
   - "samples" (WRONG) -> "numSamples" (CORRECT)
3. Parameters are read with ->get(): driveParam->get()
4. Variables are already declared; use them directly: channelData[sample]"#;

const FRAGMENT_OUTPUT: &str = r#"OUTPUT FORMAT:
Output ONLY the C++ statements that go between the markers, in one block:
```cpp
wet = std::tanh(dry * drive);
```
Do NOT include #include lines, class definitions, function signatures or the
marker comments."#;

fn bullet_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep the end of a long build log, where compilers put the first error
/// summary and CI puts the failing step.
pub fn clip_error(error: &str) -> &str {
    let error = error.trim();
    if error.chars().count() <= MAX_ERROR_PROMPT_CHARS {
        return error;
    }
    let skip = error.chars().count() - MAX_ERROR_PROMPT_CHARS;
    let start = error
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &error[start..]
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEMA
// ═══════════════════════════════════════════════════════════════════════════════

pub const SCHEMA_SYSTEM: &str = r#"You are FxForge, an audio plugin designer.

Describe the requested effect as a structured plugin record. You never write
C++; a renderer turns your record into source code.

Rules:
- Pick the closest category; use "gain" when nothing else fits.
- 1 to 8 parameters, camelCase names, short labels.
- Parameter ranges must contain their defaults.
- Only fill the DSP block that matches the category.
- Output a single JSON object and nothing else."#;

pub fn schema_prompt(request: &str) -> String {
    format!(
        "Based on the following plugin request, output a structured JSON response.\n\nUSER REQUEST:\n{}",
        request.trim()
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE INJECTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn template_system(skeleton: &Skeleton, catalog_context: &str) -> String {
    let mut prompt = String::from(
        r#"You are FxForge, an audio DSP specialist.

TASK: Write ONLY the inner-loop DSP code for the marked hole of a plugin.
Everything else in the plugin already exists.

=== EXACT IDENTIFIERS YOU MUST USE ===
"#,
    );
    prompt.push_str(catalog_context);
    prompt.push_str("\n\n=== TEMPLATE CONTEXT ===\n");
    prompt.push_str(&format!("Template: {}\n", skeleton.title));
    prompt.push_str("Your code lands inside this function:\n```cpp\n");
    prompt.push_str(skeleton.process_block());
    prompt.push_str("```\n\n=== CONSTRAINTS ===\n");
    prompt.push_str(&bullet_list(skeleton.guidance));
    prompt.push_str("\n\n");
    prompt.push_str(IDENTIFIER_RULES);
    prompt.push_str("\n\n");
    prompt.push_str(FRAGMENT_OUTPUT);
    prompt
}

pub fn template_prompt(request: &str) -> String {
    format!("USER REQUEST:\n{}", request.trim())
}

/// In-strategy rewrite after the gate rejected a fragment.
pub fn logic_rewrite_prompt(errors: &[String], catalog_context: &str, logic: &str) -> String {
    format!(
        r#"Fix the following C++ DSP logic. It uses identifiers that do not exist.

ERRORS:
{errors}

{catalog_context}

ORIGINAL CODE:
```cpp
{logic}
```

Rewrite using ONLY the identifiers listed above. Keep the intent of the code.
Return ONLY the corrected code in one ```cpp block, no explanations."#,
        errors = bullet_list(&errors.iter().map(String::as_str).collect::<Vec<_>>()),
        logic = logic.trim(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// FULL GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn full_system() -> String {
    format!(
        r#"You are FxForge, an expert C++ audio developer working with JUCE 8.

TASK: Write complete source files for the plugin the user describes.

TECHNICAL CONSTRAINTS:
- JUCE 8, C++17
- Parameters: juce::AudioParameterFloat/Int/Choice held as raw pointers from addParameter
- Memory: std::unique_ptr for owned objects, never raw new/delete outside addParameter and createEditor
- Never touch UI components from processBlock
- No file, process or network access of any kind

REQUIRED CLASS NAMES (DO NOT CHANGE):
- Processor class: {PROCESSOR_CLASS}
- Editor class: {EDITOR_CLASS}

REQUIRED INCLUDES:
- Both .cpp files include "PluginProcessor.h" and "PluginEditor.h"

OUTPUT FORMAT:
Output exactly these code blocks with these EXACT labels:
```cpp Source/PluginProcessor.cpp
[complete file]
```

```cpp Source/PluginEditor.cpp
[complete file]
```

You may also output ```cpp Source/PluginProcessor.h and ```cpp Source/PluginEditor.h
blocks when the headers need new members.

REQUIREMENTS:
1. Complete files, not snippets
2. Every function: constructor, destructor, processBlock, paint, resized
3. getName() returns JucePlugin_Name
4. createPluginFilter() at the end of PluginProcessor.cpp
5. The code must compile without modification"#
    )
}

pub fn full_prompt(request: &str) -> String {
    format!("USER REQUEST:\n{}", request.trim())
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPAIR
// ═══════════════════════════════════════════════════════════════════════════════

fn attempt_line(ctx: RepairContext) -> String {
    format!(
        "This is repair attempt {} of {}.",
        ctx.attempt, ctx.max_attempts
    )
}

/// Rewrite an injected fragment after a failed build.
pub fn fragment_repair_prompt(
    build_error: &str,
    fragment: &str,
    skeleton: &Skeleton,
    catalog_context: &str,
    ctx: RepairContext,
) -> String {
    format!(
        r#"The DSP logic you provided caused a build failure. {attempt}

COMPILER ERROR:
{error}

ORIGINAL LOGIC:
```cpp
{fragment}
```

{catalog_context}

CONSTRAINTS:
{constraints}

Fix the error using ONLY the identifiers listed above.
{output}"#,
        attempt = attempt_line(ctx),
        error = clip_error(build_error),
        fragment = fragment.trim(),
        constraints = bullet_list(skeleton.guidance),
        output = FRAGMENT_OUTPUT,
    )
}

/// Ask for a corrected complete file after a failed build.
pub fn file_repair_prompt(
    build_error: &str,
    code: &str,
    file_name: &str,
    ctx: RepairContext,
) -> String {
    format!(
        r#"The following C++ code failed to compile. {attempt}

COMPILER ERROR:
{error}

ORIGINAL CODE ({file_name}):
```cpp
{code}
```

Fix the compilation error and output the corrected COMPLETE file.
Wrap your output in:
```cpp Source/{file_name}
[corrected complete code]
```

IMPORTANT:
- Output the COMPLETE file, not just the fixed section
- Keep all existing functionality
- Keep the class names {PROCESSOR_CLASS} and {EDITOR_CLASS}
- No file, process or network access"#,
        attempt = attempt_line(ctx),
        error = clip_error(build_error),
        code = code.trim_end(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxforge_core::catalog::{Catalog, PluginCategory};

    #[test]
    fn test_clip_error_keeps_the_tail() {
        let long = format!("{}TAIL", "x".repeat(MAX_ERROR_PROMPT_CHARS + 50));
        let clipped = clip_error(&long);
        assert_eq!(clipped.chars().count(), MAX_ERROR_PROMPT_CHARS);
        assert!(clipped.ends_with("TAIL"));
        assert_eq!(clip_error("  short  "), "short");
    }

    #[test]
    fn test_clip_error_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_PROMPT_CHARS + 3);
        assert_eq!(clip_error(&long).chars().count(), MAX_ERROR_PROMPT_CHARS);
    }

    #[test]
    fn test_template_system_lists_identifiers_and_hole() {
        let catalog = Catalog::builtin().unwrap();
        let skeleton = Skeleton::for_category(PluginCategory::Waveshaper);
        let context = catalog.context_prompt(PluginCategory::Waveshaper);
        let prompt = template_system(skeleton, &context);
        assert!(prompt.contains("driveParam"));
        assert!(prompt.contains("processBlock"));
        assert!(prompt.contains("assign the shaped result to wet"));
    }

    #[test]
    fn test_logic_rewrite_prompt_carries_errors_verbatim() {
        let errors = vec!["Undeclared identifier: 'masterVolume'".to_string()];
        let prompt = logic_rewrite_prompt(&errors, "CONTEXT", "wet = dry * masterVolume;");
        assert!(prompt.contains("- Undeclared identifier: 'masterVolume'"));
        assert!(prompt.contains("wet = dry * masterVolume;"));
    }

    #[test]
    fn test_full_system_names_the_classes() {
        let prompt = full_system();
        assert!(prompt.contains(PROCESSOR_CLASS));
        assert!(prompt.contains("```cpp Source/PluginEditor.cpp"));
    }

    #[test]
    fn test_file_repair_prompt_labels_the_block() {
        let ctx = RepairContext {
            attempt: 2,
            max_attempts: 3,
        };
        let prompt = file_repair_prompt("error: boom", "int x;", "PluginProcessor.cpp", ctx);
        assert!(prompt.contains("repair attempt 2 of 3"));
        assert!(prompt.contains("```cpp Source/PluginProcessor.cpp"));
        assert!(prompt.contains("error: boom"));
    }
}
