//! Step execution and run orchestration.
//!
//! Steps run strictly in declared order: relocations first, then the patch
//! steps, then the optional schema migration. Every per-step error is
//! converted into a report entry at the step boundary; one broken anchor
//! never aborts the run. A step's replacement content is computed entirely
//! in memory and committed with an atomic rename, so an artifact is always
//! either unchanged or fully transformed.

use crate::anchor::excerpt;
use crate::config::{MigrationDef, Relocation, StepDef, StepsFile};
use crate::guard::GuardError;
use crate::locate::{self, CandidateSet, LocateOutcome};
use crate::migrate::{self, MigrationOutcome};
use crate::report::{AppliedDetail, ApplyResult, Report, StepOutcome};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Whether writes are committed or only evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Commit writes to artifacts.
    Apply,
    /// Evaluate guard and matcher per step without touching any artifact.
    Check,
}

#[derive(Error, Debug)]
pub enum StepError {
    #[error("artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    #[error("artifact escapes the project root: {0}")]
    OutsideRoot(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Anchor(#[from] crate::anchor::MatchError),
}

/// Run one steps file against the project root.
///
/// The root is resolved by the caller once and passed in explicitly; no
/// component reads the current directory mid-run.
pub fn run(file: &StepsFile, root: &Path, mode: RunMode) -> Report {
    let mut report = Report::default();

    for relocation in &file.relocations {
        report.push(run_relocation(relocation, root, mode));
    }

    for step in &file.steps {
        execute_step(step, root, mode, &mut report);
    }

    if let Some(migration) = &file.migration {
        run_migration(migration, root, mode, &mut report);
    }

    report
}

fn run_relocation(relocation: &Relocation, root: &Path, mode: RunMode) -> ApplyResult {
    let set = CandidateSet {
        ranked: relocation.candidates.iter().map(PathBuf::from).collect(),
        name_tokens: relocation.name_tokens.clone(),
        extension: relocation.extension.clone(),
    };
    let destination = PathBuf::from(&relocation.destination);

    let outcome = match locate::relocate(root, &destination, &set, mode == RunMode::Check) {
        Ok(LocateOutcome::AlreadyInPlace) => StepOutcome::Skipped,
        Ok(LocateOutcome::Copied { source }) => StepOutcome::Applied {
            detail: AppliedDetail::Relocated { source },
        },
        Err(e) => StepOutcome::Failed {
            reason: e.to_string(),
        },
    };

    ApplyResult {
        step_id: relocation.id.clone(),
        artifact: destination,
        outcome,
    }
}

fn execute_step(step: &StepDef, root: &Path, mode: RunMode, report: &mut Report) {
    let outcome = match apply_step(step, root, mode, report) {
        Ok(outcome) => outcome,
        Err(e) => StepOutcome::Failed {
            reason: e.to_string(),
        },
    };

    report.push(ApplyResult {
        step_id: step.id.clone(),
        artifact: PathBuf::from(&step.artifact),
        outcome,
    });
}

/// One step's state machine: guard, then match, then commit.
fn apply_step(
    step: &StepDef,
    root: &Path,
    mode: RunMode,
    report: &mut Report,
) -> Result<StepOutcome, StepError> {
    let path = resolve_artifact(root, &step.artifact)?;
    let content = fs::read_to_string(&path).map_err(|source| StepError::Io {
        path: path.clone(),
        source,
    })?;

    // Exactly one idempotency check precedes any mutation attempt.
    match step.guard.is_satisfied(&content) {
        Ok(true) => return Ok(StepOutcome::Skipped),
        Ok(false) => {}
        Err(GuardError::Empty) => {
            // Conservative: an unevaluable guard must not silently skip.
            report.diagnostic(format!(
                "step '{}': guard could not be evaluated, proceeding to matching",
                step.id
            ));
        }
    }

    let resolved = step.anchors.resolve(&content)?;

    if mode == RunMode::Apply {
        write_artifact(&path, resolved.content.as_bytes())?;
    }

    Ok(StepOutcome::Applied {
        detail: AppliedDetail::Spliced {
            anchor_index: resolved.candidate_index,
            anchor_pattern: excerpt(&resolved.pattern),
        },
    })
}

/// Resolve a root-relative selector, rejecting paths that escape the root.
fn resolve_artifact(root: &Path, selector: &str) -> Result<PathBuf, StepError> {
    let path = root.join(selector);
    if !path.is_file() {
        return Err(StepError::ArtifactMissing(path));
    }

    let io = |path: PathBuf| move |source| StepError::Io { path, source };
    let canonical = path.canonicalize().map_err(io(path.clone()))?;
    let canonical_root = root
        .canonicalize()
        .map_err(io(root.to_path_buf()))?;

    if !canonical.starts_with(&canonical_root) {
        return Err(StepError::OutsideRoot(canonical));
    }

    Ok(canonical)
}

/// Atomic rewrite: tempfile in the same directory, fsync, rename, then an
/// mtime touch so watch-based dev servers pick up the change.
fn write_artifact(path: &Path, content: &[u8]) -> Result<(), StepError> {
    let io = |source| StepError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().ok_or_else(|| {
        io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io)?;
    temp.write_all(content).map_err(io)?;
    temp.as_file().sync_all().map_err(io)?;
    temp.persist(path).map_err(|e| io(e.error))?;

    filetime::set_file_mtime(path, filetime::FileTime::now()).map_err(io)?;

    Ok(())
}

fn run_migration(def: &MigrationDef, root: &Path, mode: RunMode, report: &mut Report) {
    let artifact = PathBuf::from(&def.spool_file);

    if mode == RunMode::Check {
        report.diagnostic(format!(
            "migration '{}' not executed in check mode",
            def.id
        ));
        report.push(ApplyResult {
            step_id: def.id.clone(),
            artifact,
            outcome: StepOutcome::Skipped,
        });
        return;
    }

    let outcome = match migrate::execute(def, root) {
        Ok(MigrationOutcome::Executed) => StepOutcome::Applied {
            detail: AppliedDetail::Executed,
        },
        Ok(MigrationOutcome::Spooled { path }) => {
            report.diagnostic(format!(
                "migration '{}' spooled to {}; execute it manually with psql",
                def.id,
                path.display()
            ));
            StepOutcome::Applied {
                detail: AppliedDetail::Spooled { path },
            }
        }
        Err(e) => StepOutcome::Failed {
            reason: e.to_string(),
        },
    };

    report.push(ApplyResult {
        step_id: def.id.clone(),
        artifact,
        outcome,
    });
}
