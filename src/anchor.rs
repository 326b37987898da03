use serde::Deserialize;
use thiserror::Error;

/// How the payload is spliced relative to a matched anchor pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    /// Payload goes immediately before the matched pattern.
    InsertBefore,
    /// Payload goes immediately after the matched pattern.
    InsertAfter,
    /// Payload replaces the matched pattern entirely.
    Replace,
}

/// One literal anchor: an exact pattern to find, plus the payload to splice
/// at its match and how.
///
/// Matching is verbatim containment: case- and whitespace-sensitive, no
/// fuzzy or structural interpretation. A candidate splices at the first
/// occurrence of its pattern.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnchorCandidate {
    pub pattern: String,
    pub placement: Placement,
    pub payload: String,
}

/// Ordered fallback chain of anchors: primary first, alternatives after.
///
/// Candidates are tried in strict declared order; the first whose pattern is
/// contained in the content wins. Adding a fallback is a data change, never
/// a control-flow change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct AnchorSpec {
    pub candidates: Vec<AnchorCandidate>,
}

/// A resolved splice: which candidate matched and the fully rebuilt content.
///
/// The new content is computed entirely in memory; nothing here touches the
/// filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a resolved edit does nothing until its content is written"]
pub struct ResolvedEdit {
    /// Index into the candidate chain (0 = primary anchor).
    pub candidate_index: usize,
    /// The pattern that matched, for report attribution.
    pub pattern: String,
    /// Full post-splice artifact content.
    pub content: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("no anchor candidate matched (tried {tried}): {patterns}")]
    NotFound { tried: usize, patterns: String },
}

impl AnchorSpec {
    /// Number of candidates in the chain.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Try each candidate in declared order against `content`; first
    /// containment match wins.
    ///
    /// Returns the spliced content or [`MatchError::NotFound`] listing every
    /// pattern that was tried, so a failed step can be fixed by hand.
    pub fn resolve(&self, content: &str) -> Result<ResolvedEdit, MatchError> {
        for (index, candidate) in self.candidates.iter().enumerate() {
            if let Some(at) = content.find(&candidate.pattern) {
                return Ok(ResolvedEdit {
                    candidate_index: index,
                    pattern: candidate.pattern.clone(),
                    content: splice(content, at, candidate),
                });
            }
        }

        let patterns = self
            .candidates
            .iter()
            .map(|c| format!("{:?}", excerpt(&c.pattern)))
            .collect::<Vec<_>>()
            .join(", ");

        Err(MatchError::NotFound {
            tried: self.candidates.len(),
            patterns,
        })
    }
}

/// Rebuild the artifact content with the candidate's payload spliced in at
/// byte offset `at` (the start of the matched pattern).
fn splice(content: &str, at: usize, candidate: &AnchorCandidate) -> String {
    let pattern_end = at + candidate.pattern.len();
    let mut out = String::with_capacity(content.len() + candidate.payload.len());

    match candidate.placement {
        Placement::InsertBefore => {
            out.push_str(&content[..at]);
            out.push_str(&candidate.payload);
            out.push_str(&content[at..]);
        }
        Placement::InsertAfter => {
            out.push_str(&content[..pattern_end]);
            out.push_str(&candidate.payload);
            out.push_str(&content[pattern_end..]);
        }
        Placement::Replace => {
            out.push_str(&content[..at]);
            out.push_str(&candidate.payload);
            out.push_str(&content[pattern_end..]);
        }
    }

    out
}

/// Shorten a pattern for diagnostics: first line, capped at 60 chars.
pub(crate) fn excerpt(pattern: &str) -> String {
    let first_line = pattern.lines().next().unwrap_or("");
    if first_line.len() <= 60 && first_line.len() == pattern.len() {
        return pattern.to_string();
    }
    let mut cut = 60.min(first_line.len());
    while !first_line.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &first_line[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(pattern: &str, placement: Placement, payload: &str) -> AnchorCandidate {
        AnchorCandidate {
            pattern: pattern.to_string(),
            placement,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_insert_before_module_exports() {
        let spec = AnchorSpec {
            candidates: vec![candidate(
                "module.exports = { router };",
                Placement::InsertBefore,
                "X\n",
            )],
        };

        let resolved = spec.resolve("module.exports = { router };").unwrap();
        assert_eq!(resolved.content, "X\nmodule.exports = { router };");
        assert_eq!(resolved.candidate_index, 0);
    }

    #[test]
    fn test_insert_after() {
        let spec = AnchorSpec {
            candidates: vec![candidate("<style>", Placement::InsertAfter, "\n.x{}")],
        };

        let resolved = spec.resolve("<style></style>").unwrap();
        assert_eq!(resolved.content, "<style>\n.x{}</style>");
    }

    #[test]
    fn test_replace_range() {
        let spec = AnchorSpec {
            candidates: vec![candidate("share-2", Placement::Replace, "calendar-plus")],
        };

        let resolved = spec.resolve("icon=\"share-2\" x share-2").unwrap();
        // First occurrence only.
        assert_eq!(resolved.content, "icon=\"calendar-plus\" x share-2");
    }

    #[test]
    fn test_fallback_order_first_match_wins() {
        let spec = AnchorSpec {
            candidates: vec![
                candidate("primary-marker", Placement::InsertBefore, "A"),
                candidate("secondary-marker", Placement::InsertBefore, "B"),
            ],
        };

        // Content has both; primary must win.
        let both = spec.resolve("secondary-marker primary-marker").unwrap();
        assert_eq!(both.candidate_index, 0);
        assert_eq!(both.content, "secondary-marker Aprimary-marker");

        // Content has only the fallback.
        let fallback = spec.resolve("only secondary-marker here").unwrap();
        assert_eq!(fallback.candidate_index, 1);
        assert_eq!(fallback.pattern, "secondary-marker");
    }

    #[test]
    fn test_no_match_reports_all_patterns() {
        let spec = AnchorSpec {
            candidates: vec![
                candidate("alpha", Placement::InsertBefore, ""),
                candidate("beta", Placement::InsertAfter, ""),
            ],
        };

        let err = spec.resolve("gamma").unwrap_err();
        match err {
            MatchError::NotFound { tried, patterns } => {
                assert_eq!(tried, 2);
                assert!(patterns.contains("alpha"));
                assert!(patterns.contains("beta"));
            }
        }
    }

    #[test]
    fn test_matching_is_exact() {
        let spec = AnchorSpec {
            candidates: vec![candidate("Module.Exports", Placement::InsertBefore, "X")],
        };

        // Case-sensitive: lowercase content must not match.
        assert!(spec.resolve("module.exports").is_err());
    }

    #[test]
    fn test_empty_spec_never_matches() {
        let spec = AnchorSpec::default();
        assert!(spec.resolve("anything").is_err());
    }

    #[test]
    fn test_excerpt_truncates_long_patterns() {
        let long = "x".repeat(200);
        let short = excerpt(&long);
        assert!(short.len() < long.len());
        assert!(short.ends_with('…'));

        assert_eq!(excerpt("short"), "short");
        // Multi-line patterns collapse to their first line.
        assert_eq!(excerpt("line one\nline two"), "line one…");
    }
}
