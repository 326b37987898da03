use serde::Deserialize;
use thiserror::Error;

/// Content test whose truth means a step's effect is already present.
///
/// Evaluation is a pure read over the artifact content and runs strictly
/// before any anchor matching. The algebra is deliberately small: plain
/// containment plus conjunction and disjunction of containments, nothing
/// beyond what a re-runnable patch needs to recognize itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Predicate {
    /// A single marker substring.
    Contains { needle: String },
    /// Every needle must be present. Several independent markers reduce
    /// false positives: a partially-applied patch may contain only one of
    /// its inserted fragments.
    AllOf { needles: Vec<String> },
    /// At least one needle must be present.
    AnyOf { needles: Vec<String> },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("predicate has no needles to test")]
    Empty,
}

impl Predicate {
    /// Evaluate the predicate against artifact content.
    ///
    /// A declared-but-empty needle set is an evaluation error; the caller
    /// treats it conservatively (proceed to matching, never silently skip).
    pub fn is_satisfied(&self, content: &str) -> Result<bool, GuardError> {
        match self {
            Predicate::Contains { needle } => {
                if needle.is_empty() {
                    return Err(GuardError::Empty);
                }
                Ok(content.contains(needle.as_str()))
            }
            Predicate::AllOf { needles } => {
                if needles.is_empty() || needles.iter().any(String::is_empty) {
                    return Err(GuardError::Empty);
                }
                Ok(needles.iter().all(|n| content.contains(n.as_str())))
            }
            Predicate::AnyOf { needles } => {
                if needles.is_empty() || needles.iter().any(String::is_empty) {
                    return Err(GuardError::Empty);
                }
                Ok(needles.iter().any(|n| content.contains(n.as_str())))
            }
        }
    }

    /// Markers this predicate tests for, for list/status output.
    pub fn needles(&self) -> Vec<&str> {
        match self {
            Predicate::Contains { needle } => vec![needle.as_str()],
            Predicate::AllOf { needles } | Predicate::AnyOf { needles } => {
                needles.iter().map(String::as_str).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let p = Predicate::Contains {
            needle: "/recommended".to_string(),
        };
        assert_eq!(p.is_satisfied("router.get('/recommended', ...)"), Ok(true));
        assert_eq!(p.is_satisfied("router.get('/events', ...)"), Ok(false));
    }

    #[test]
    fn test_all_of_requires_every_fragment() {
        let p = Predicate::AllOf {
            needles: vec!["rec-section".to_string(), "loadRecommended".to_string()],
        };
        assert_eq!(p.is_satisfied("rec-section loadRecommended"), Ok(true));
        // A half-applied patch with only one fragment must not be skipped.
        assert_eq!(p.is_satisfied("rec-section only"), Ok(false));
    }

    #[test]
    fn test_any_of() {
        let p = Predicate::AnyOf {
            needles: vec!["calendar-plus".to_string(), "calendar_plus".to_string()],
        };
        assert_eq!(p.is_satisfied("icon: calendar_plus"), Ok(true));
        assert_eq!(p.is_satisfied("icon: share-2"), Ok(false));
    }

    #[test]
    fn test_empty_needles_are_an_error() {
        assert_eq!(
            Predicate::Contains {
                needle: String::new()
            }
            .is_satisfied("x"),
            Err(GuardError::Empty)
        );
        assert_eq!(
            Predicate::AllOf { needles: vec![] }.is_satisfied("x"),
            Err(GuardError::Empty)
        );
        assert_eq!(
            Predicate::AnyOf {
                needles: vec!["ok".to_string(), String::new()]
            }
            .is_satisfied("x"),
            Err(GuardError::Empty)
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let p = Predicate::Contains {
            needle: "RecSection".to_string(),
        };
        assert_eq!(p.is_satisfied("recsection"), Ok(false));
    }
}
