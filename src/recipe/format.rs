//! Whitespace normalisation that never changes the parsed value

use serde_yaml::Value;

use super::check::parse_yaml;
use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    pub text: String,
    pub changed: bool,
    /// Set when full normalisation would alter the value and only line
    /// endings were fixed
    pub conservative: bool,
}

/// Normalise a recipe's layout.
///
/// LF line endings, no trailing whitespace, no runs of blank lines, tabs in
/// indentation expanded, one final newline. If that would change the parsed
/// value (block scalars with significant whitespace), only line endings and
/// the final newline are touched; if even that changes it, the text is left
/// alone.
pub fn format_recipe(text: &str, filename: &str) -> Result<Formatted, ToolError> {
    let original = parse_yaml(text, filename)?;

    let full = normalise(text);
    if same_value(&full, &original) {
        return Ok(Formatted {
            changed: full != text,
            text: full,
            conservative: false,
        });
    }

    let minimal = line_endings_only(text);
    if same_value(&minimal, &original) {
        return Ok(Formatted {
            changed: minimal != text,
            text: minimal,
            conservative: true,
        });
    }

    Ok(Formatted {
        text: text.to_string(),
        changed: false,
        conservative: true,
    })
}

fn same_value(text: &str, original: &Value) -> bool {
    serde_yaml::from_str::<Value>(text).is_ok_and(|v| &v == original)
}

fn normalise(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0;

    for line in unified.lines() {
        let line = expand_indent_tabs(line.trim_end());
        if line.is_empty() {
            blank_run += 1;
            // Leading blank lines are dropped, later runs collapse to one
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&line);
        out.push('\n');
    }

    while out.ends_with("\n\n") {
        out.pop();
    }
    if out == "\n" {
        out.clear();
    }
    out
}

fn line_endings_only(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\r', "\n");
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn expand_indent_tabs(line: &str) -> String {
    let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
    let (indent, rest) = line.split_at(indent_len);
    if !indent.contains('\t') {
        return line.to_string();
    }
    let mut expanded = String::with_capacity(indent.len() * 2);
    for c in indent.chars() {
        if c == '\t' {
            expanded.push_str("  ");
        } else {
            expanded.push(c);
        }
    }
    expanded.push_str(rest);
    expanded
}
