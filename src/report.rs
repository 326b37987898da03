use std::fmt;
use std::path::PathBuf;

/// What an Applied outcome actually did, for report attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedDetail {
    /// Payload spliced at a matched anchor. Index 0 is the primary anchor;
    /// anything higher means a fallback candidate was used.
    Spliced {
        anchor_index: usize,
        anchor_pattern: String,
    },
    /// Misplaced artifact copied to its canonical destination.
    Relocated { source: PathBuf },
    /// Schema statement executed against the database.
    Executed,
    /// Schema statement written to disk for manual execution, the
    /// degraded mode when credentials or the client are unavailable.
    Spooled { path: PathBuf },
}

/// Terminal outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "StepOutcome should be recorded in the report"]
pub enum StepOutcome {
    /// The step's effect was committed.
    Applied { detail: AppliedDetail },
    /// The guard found the effect already present; the artifact was not
    /// touched.
    Skipped,
    /// The step could not be applied; the artifact is byte-identical to its
    /// pre-step state.
    Failed { reason: String },
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

/// One entry in the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    pub step_id: String,
    pub artifact: PathBuf,
    pub outcome: StepOutcome,
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            StepOutcome::Applied { detail } => match detail {
                AppliedDetail::Spliced {
                    anchor_index,
                    anchor_pattern,
                } if *anchor_index > 0 => write!(
                    f,
                    "{}: applied to {} via fallback anchor #{} ({:?})",
                    self.step_id,
                    self.artifact.display(),
                    anchor_index,
                    anchor_pattern
                ),
                AppliedDetail::Spliced { .. } => {
                    write!(f, "{}: applied to {}", self.step_id, self.artifact.display())
                }
                AppliedDetail::Relocated { source } => write!(
                    f,
                    "{}: copied {} to {}",
                    self.step_id,
                    source.display(),
                    self.artifact.display()
                ),
                AppliedDetail::Executed => {
                    write!(f, "{}: schema statement executed", self.step_id)
                }
                AppliedDetail::Spooled { path } => write!(
                    f,
                    "{}: schema statement spooled to {} for manual execution",
                    self.step_id,
                    path.display()
                ),
            },
            StepOutcome::Skipped => write!(
                f,
                "{}: already applied to {}",
                self.step_id,
                self.artifact.display()
            ),
            StepOutcome::Failed { reason } => write!(
                f,
                "{}: failed on {}: {}",
                self.step_id,
                self.artifact.display(),
                reason
            ),
        }
    }
}

/// Three-way categorization of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every step Applied or Skipped.
    Full,
    /// Some steps landed, some failed.
    Partial,
    /// Every step that ran failed.
    NoneApplied,
}

/// Ordered record of a run: one result per step in declared order, plus
/// collected diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub results: Vec<ApplyResult>,
    pub diagnostics: Vec<String>,
}

impl Report {
    pub fn push(&mut self, result: ApplyResult) {
        self.results.push(result);
    }

    pub fn diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }

    pub fn applied_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_applied()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Skipped))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failed()).count()
    }

    /// Failed entries, in declared order, with enough detail (artifact,
    /// unmatched anchors) for a manual fix.
    pub fn failures(&self) -> impl Iterator<Item = &ApplyResult> {
        self.results.iter().filter(|r| r.outcome.is_failed())
    }

    pub fn status(&self) -> RunStatus {
        let failed = self.failed_count();
        if failed == 0 {
            RunStatus::Full
        } else if failed == self.results.len() {
            RunStatus::NoneApplied
        } else {
            RunStatus::Partial
        }
    }
}
