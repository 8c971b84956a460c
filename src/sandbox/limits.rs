//! Execution limits: stopping criteria and output truncation

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::error::ToolError;

/// Marker appended to truncated inline output
pub const TRUNCATION_MARKER: &str = "\n…(truncated)…\n";

/// Requested target row count for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetNumber {
    pub table: String,
    pub count: i64,
}

/// How a run decides when to stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoppingCriterion {
    Reps { reps: u64 },
    Target { table: String, count: u64 },
}

impl StoppingCriterion {
    pub fn describe(&self) -> String {
        match self {
            StoppingCriterion::Reps { reps } => format!("{} repetition(s)", reps),
            StoppingCriterion::Target { table, count } => format!("{} {} row(s)", count, table),
        }
    }
}

/// Check a run request's stopping criterion against the configured ceilings.
pub fn stopping_criterion(
    limits: &LimitsConfig,
    reps: Option<i64>,
    target_number: Option<&TargetNumber>,
) -> Result<StoppingCriterion, ToolError> {
    match (reps, target_number) {
        (Some(_), Some(_)) => Err(ToolError::validation("Provide only one of reps or target_number")),
        (None, None) if limits.require_bounded_runs => Err(ToolError::validation(
            "A stopping criterion is required: provide reps or target_number",
        )),
        (None, None) => Ok(StoppingCriterion::Reps { reps: 1 }),
        (Some(reps), None) => {
            if reps < 1 {
                return Err(ToolError::validation("reps must be >= 1"));
            }
            let reps = reps as u64;
            if reps > limits.max_reps {
                return Err(ToolError::limit(format!(
                    "reps exceeds server limit ({})",
                    limits.max_reps
                )));
            }
            Ok(StoppingCriterion::Reps { reps })
        }
        (None, Some(target)) => {
            let table = target.table.trim();
            if table.is_empty() {
                return Err(ToolError::validation("target_number.table must be a non-empty string"));
            }
            if target.count < 1 {
                return Err(ToolError::validation("target_number.count must be an integer >= 1"));
            }
            let count = target.count as u64;
            if count > limits.max_target_count {
                return Err(ToolError::limit(format!(
                    "target_number.count exceeds server limit ({})",
                    limits.max_target_count
                )));
            }
            Ok(StoppingCriterion::Target {
                table: table.to_string(),
                count,
            })
        }
    }
}

/// Truncate `text` to at most `max_chars` characters.
///
/// Returns the (possibly shortened) text and whether truncation happened.
pub fn truncate(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        None => (text.to_string(), false),
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_idx]);
            out.push_str(TRUNCATION_MARKER);
            (out, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn limits() -> LimitsConfig {
        LimitsConfig::default()
    }

    fn target(table: &str, count: i64) -> TargetNumber {
        TargetNumber {
            table: table.to_string(),
            count,
        }
    }

    #[test]
    fn test_defaults_to_single_rep_when_unbounded_runs_allowed() {
        let criterion = stopping_criterion(&limits(), None, None).unwrap();
        assert_eq!(criterion, StoppingCriterion::Reps { reps: 1 });
    }

    #[test]
    fn test_requires_criterion_when_bounded_runs_enforced() {
        let mut limits = limits();
        limits.require_bounded_runs = true;

        let err = stopping_criterion(&limits, None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);

        assert!(stopping_criterion(&limits, Some(2), None).is_ok());
        assert!(stopping_criterion(&limits, None, Some(&target("Account", 5))).is_ok());
    }

    #[test]
    fn test_rejects_both_criteria() {
        let err = stopping_criterion(&limits(), Some(1), Some(&target("Account", 5))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn test_reps_bounds() {
        assert_eq!(
            stopping_criterion(&limits(), Some(0), None).unwrap_err().kind,
            ErrorKind::ValidationError
        );
        assert_eq!(
            stopping_criterion(&limits(), Some(11), None).unwrap_err().kind,
            ErrorKind::ResourceLimitExceeded
        );
        assert_eq!(
            stopping_criterion(&limits(), Some(10), None).unwrap(),
            StoppingCriterion::Reps { reps: 10 }
        );
    }

    #[test]
    fn test_target_bounds() {
        assert_eq!(
            stopping_criterion(&limits(), None, Some(&target("", 5))).unwrap_err().kind,
            ErrorKind::ValidationError
        );
        assert_eq!(
            stopping_criterion(&limits(), None, Some(&target("Account", -3))).unwrap_err().kind,
            ErrorKind::ValidationError
        );
        assert_eq!(
            stopping_criterion(&limits(), None, Some(&target("Account", 1_001)))
                .unwrap_err()
                .kind,
            ErrorKind::ResourceLimitExceeded
        );
        assert_eq!(
            stopping_criterion(&limits(), None, Some(&target(" Account ", 5))).unwrap(),
            StoppingCriterion::Target {
                table: "Account".to_string(),
                count: 5
            }
        );
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        let (out, truncated) = truncate("hello", 10);
        assert_eq!(out, "hello");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_exact_length_untouched() {
        let (out, truncated) = truncate("hello", 5);
        assert_eq!(out, "hello");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_appends_marker() {
        let (out, truncated) = truncate("hello world", 5);
        assert!(truncated);
        assert_eq!(out, format!("hello{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let (out, truncated) = truncate("ééééé", 2);
        assert!(truncated);
        assert!(out.starts_with("éé"));
    }
}
