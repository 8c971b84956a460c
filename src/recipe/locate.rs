//! Line lookup for YAML nodes
//!
//! `serde_yaml::Value` carries no source positions, so locations are recovered
//! by scanning the text for the n-th `key: value` occurrence. Walkers visit
//! mappings in document order and count occurrences the same way.

use std::collections::HashMap;

/// Counts `(key, value)` occurrences during a document-order walk and maps
/// each one back to a 1-based line.
#[derive(Debug)]
pub struct Locator<'a> {
    text: &'a str,
    seen: HashMap<(String, String), usize>,
}

impl<'a> Locator<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            seen: HashMap::new(),
        }
    }

    /// Record the next occurrence of `key: value` and return its line.
    pub fn next(&mut self, key: &str, value: &str) -> Option<usize> {
        let counter = self.seen.entry((key.to_string(), value.to_string())).or_insert(0);
        let nth = *counter;
        *counter += 1;
        find_key_value_line(self.text, key, value, nth)
    }
}

/// 1-based line of the `nth` (0-based) `key: value` pair in `text`.
///
/// Matches block mappings (`key: value`), sequence entries (`- key: value`)
/// and flow mappings (`{key: value}`); the value may be single- or
/// double-quoted.
pub fn find_key_value_line(text: &str, key: &str, value: &str, nth: usize) -> Option<usize> {
    let mut count = 0;
    for (idx, line) in text.lines().enumerate() {
        let content = strip_comment(line);
        let mut search_from = 0;
        while let Some(pos) = content[search_from..].find(key) {
            let start = search_from + pos;
            search_from = start + key.len();
            if !is_key_boundary(content, start) {
                continue;
            }
            let rest = &content[start + key.len()..];
            let rest = rest.strip_prefix(['"', '\'']).unwrap_or(rest);
            let Some(after_colon) = rest.strip_prefix(':') else {
                continue;
            };
            if value_matches(after_colon, value) {
                if count == nth {
                    return Some(idx + 1);
                }
                count += 1;
            }
        }
    }
    None
}

/// 1-based line of the first top-level sequence entry whose first key is `key`.
pub fn find_statement_line(text: &str, key: &str, nth: usize) -> Option<usize> {
    let mut count = 0;
    for (idx, line) in text.lines().enumerate() {
        let Some(rest) = line.strip_prefix('-') else {
            continue;
        };
        let rest = rest.trim_start();
        if rest.starts_with(key) && rest[key.len()..].starts_with(':') {
            if count == nth {
                return Some(idx + 1);
            }
            count += 1;
        }
    }
    None
}

fn is_key_boundary(content: &str, start: usize) -> bool {
    let before = content[..start].chars().next_back();
    match before {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_'),
    }
}

fn value_matches(after_colon: &str, value: &str) -> bool {
    let v = after_colon.trim_start();
    let v = v.strip_prefix(['"', '\'']).unwrap_or(v);
    let Some(tail) = v.strip_prefix(value) else {
        return false;
    };
    match tail.chars().next() {
        None => true,
        Some(c) => matches!(c, '"' | '\'' | ',' | '}' | ']' | ' ' | '\t' | '#'),
    }
}

fn strip_comment(line: &str) -> &str {
    // A `#` starts a comment only at line start or after whitespace
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &line[..i];
        }
    }
    line
}
