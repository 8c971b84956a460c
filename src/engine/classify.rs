//! Engine stderr → structured error
//!
//! Snowfakery reports failures as a final `Error: <message>` line, usually
//! ending in `near <file>:<line>`. YAML errors carry `line N, column M`.
//! Python tracebacks precede the message when the failure is unexpected.

use crate::error::{ErrorKind, ToolError};

const TRACEBACK_HEADER: &str = "Traceback (most recent call last):";

const VALIDATION_MARKERS: &[&str] = &[
    "DataGenNameError",
    "DataGenValueError",
    "DataGenTypeError",
    "DataGenValidationError",
    "strict mode",
    "strict_mode",
    "Unknown field",
    "Cannot find an object named",
    "Cannot find a nickname",
    "is not defined",
    "has no attribute",
    "Unknown plugin",
    "Cannot find macro",
    "is not a valid",
];

const SYNTAX_MARKERS: &[&str] = &[
    "DataGenSyntaxError",
    "ScannerError",
    "ParserError",
    "YAMLError",
    "while scanning",
    "while parsing",
    "mapping values are not allowed",
    "found character that cannot start any token",
    "could not find expected",
];

/// Classify a failed engine invocation.
///
/// `recipe_file` is the path the engine was given; locations naming it are
/// reported as `display_name`.
pub fn classify_failure(stderr: &str, stdout: &str, recipe_file: &str, display_name: &str) -> ToolError {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let traceback = extract_traceback(text);
    let raw_message = final_message(text).unwrap_or_else(|| "Snowfakery failed without an error message".to_string());

    let (message, location) = split_location(&raw_message);
    let kind = kind_of(text);

    let mut err = ToolError::new(kind, message);
    let (file, line, column) = match location {
        Some((file, line)) => (Some(file), Some(line), None),
        None => match yaml_location(text) {
            Some((line, column)) => (None, Some(line), Some(column)),
            None => (None, None, None),
        },
    };
    if line.is_some() || file.is_some() {
        let file = match file {
            Some(f) if f == recipe_file => display_name.to_string(),
            Some(f) => f,
            None => display_name.to_string(),
        };
        err = err.at(file, line, column);
    }
    if let Some(tb) = traceback {
        err = err.with_traceback(tb);
    }
    err
}

fn kind_of(text: &str) -> ErrorKind {
    if SYNTAX_MARKERS.iter().any(|m| text.contains(m)) {
        ErrorKind::SyntaxError
    } else if VALIDATION_MARKERS.iter().any(|m| text.contains(m)) {
        ErrorKind::ValidationError
    } else {
        ErrorKind::RuntimeError
    }
}

/// The `Error:` line, or the last non-traceback line
fn final_message(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()).collect();

    if let Some(idx) = lines.iter().rposition(|l| l.starts_with("Error:")) {
        // Click wraps long messages; continuation lines follow the Error line
        let mut message = lines[idx].trim_start_matches("Error:").trim().to_string();
        for cont in &lines[idx + 1..] {
            message.push(' ');
            message.push_str(cont.trim());
        }
        return Some(message);
    }

    lines
        .iter()
        .rev()
        .find(|l| !l.starts_with(' ') && !l.starts_with(TRACEBACK_HEADER))
        .map(|l| l.trim().to_string())
}

/// Split `... near <file>:<line>` into message and location
fn split_location(message: &str) -> (String, Option<(String, usize)>) {
    let Some(idx) = message.rfind(" near ") else {
        return (message.to_string(), None);
    };
    let tail = message[idx + " near ".len()..].trim().trim_end_matches('.');
    let Some((file, line)) = tail.rsplit_once(':') else {
        return (message.to_string(), None);
    };
    match line.trim().parse::<usize>() {
        Ok(line) if !file.is_empty() => (message[..idx].trim().to_string(), Some((file.to_string(), line))),
        _ => (message.to_string(), None),
    }
}

/// `line N, column M` as produced by PyYAML marks
fn yaml_location(text: &str) -> Option<(usize, usize)> {
    let idx = text.find("line ")?;
    let rest = &text[idx + "line ".len()..];
    let (line, rest) = rest.split_once(',')?;
    let line = line.trim().parse::<usize>().ok()?;
    let rest = rest.trim_start().strip_prefix("column ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let column = digits.parse::<usize>().ok()?;
    Some((line, column))
}

fn extract_traceback(text: &str) -> Option<String> {
    let start = text.find(TRACEBACK_HEADER)?;
    Some(text[start..].trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = "/ws/.snowfakery-mcp/runs/run-1-abcdef01/recipe.yml";

    #[test]
    fn test_reference_error_with_location() {
        let stderr = format!("Error: Cannot find an object named Acount near {}:5\n", RECIPE);
        let err = classify_failure(&stderr, "", RECIPE, "<recipe_text>");
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert_eq!(err.message, "Cannot find an object named Acount");
        assert_eq!(err.filename.as_deref(), Some("<recipe_text>"));
        assert_eq!(err.line, Some(5));
    }

    #[test]
    fn test_yaml_error_is_syntax() {
        let stderr = "Error: mapping values are not allowed here\n  in \"recipe.yml\", line 3, column 9\n";
        let err = classify_failure(stderr, "", RECIPE, "recipes/a.yml");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.line, Some(3));
        assert_eq!(err.column, Some(9));
        assert_eq!(err.filename.as_deref(), Some("recipes/a.yml"));
    }

    #[test]
    fn test_unknown_failure_is_runtime_with_traceback() {
        let stderr = "Traceback (most recent call last):\n  File \"x.py\", line 1, in <module>\nZeroDivisionError: division by zero\n";
        let err = classify_failure(stderr, "", RECIPE, "<recipe_text>");
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.message, "ZeroDivisionError: division by zero");
        assert!(err.traceback.as_deref().unwrap().starts_with(TRACEBACK_HEADER));
    }

    #[test]
    fn test_other_file_location_kept() {
        let err = classify_failure(
            "Error: Unknown field Foo near /ws/shared.yml:12\n",
            "",
            RECIPE,
            "<recipe_text>",
        );
        assert_eq!(err.filename.as_deref(), Some("/ws/shared.yml"));
        assert_eq!(err.line, Some(12));
    }

    #[test]
    fn test_empty_stderr_falls_back_to_stdout() {
        let err = classify_failure("", "Error: something broke\n", RECIPE, "<recipe_text>");
        assert_eq!(err.message, "something broke");
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert!(err.line.is_none());
    }
}
