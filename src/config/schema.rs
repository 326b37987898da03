use crate::anchor::AnchorSpec;
use crate::guard::Predicate;
use serde::Deserialize;
use std::fmt;

/// One declarative steps file: metadata, relocations to run first, the
/// ordered patch-step table, and at most one schema-administration step.
///
/// Declaration order is a dependency contract: later steps may assume
/// earlier steps' artifacts already reflect earlier edits.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StepsFile {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub relocations: Vec<Relocation>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub migration: Option<MigrationDef>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One named patch step bound to one artifact.
#[derive(Debug, Deserialize, Clone)]
pub struct StepDef {
    pub id: String,
    /// Root-relative path of the artifact to mutate.
    pub artifact: String,
    /// Idempotency test run before any matching; true short-circuits to
    /// Skipped.
    pub guard: Predicate,
    /// Ordered anchor chain, primary first.
    pub anchors: AnchorSpec,
}

/// Best-effort recovery of a misplaced artifact, run before any patch step.
#[derive(Debug, Deserialize, Clone)]
pub struct Relocation {
    pub id: String,
    /// Root-relative canonical destination.
    pub destination: String,
    /// Ranked root-relative guesses, most likely first.
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Case-insensitive tokens the file name must contain, for the
    /// recursive fallback scan.
    #[serde(default)]
    pub name_tokens: Vec<String>,
    /// Required extension, without the dot.
    pub extension: String,
}

/// The single idempotent schema-change statement a run may carry.
#[derive(Debug, Deserialize, Clone)]
pub struct MigrationDef {
    pub id: String,
    /// Must be safe to execute multiple times (`IF NOT EXISTS` style).
    pub statement: String,
    /// Root-relative file the statement is spooled to when the client or
    /// credentials are unavailable.
    #[serde(default = "default_spool_file")]
    pub spool_file: String,
}

fn default_spool_file() -> String {
    "pending_migration.sql".to_string()
}

impl StepsFile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.steps.is_empty() && self.relocations.is_empty() && self.migration.is_none() {
            issues.push(ValidationIssue::EmptyFile);
        }

        for step in &self.steps {
            if step.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: None,
                    field: "id",
                });
            }
            if step.artifact.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: Some(step.id.clone()),
                    field: "artifact",
                });
            }
            if step.anchors.is_empty() {
                issues.push(ValidationIssue::EmptyAnchorChain {
                    step_id: step.id.clone(),
                });
            }
            for candidate in &step.anchors.candidates {
                if candidate.pattern.is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        step_id: Some(step.id.clone()),
                        field: "anchors.pattern",
                    });
                }
            }
            let needles = step.guard.needles();
            if needles.is_empty() || needles.iter().any(|n| n.is_empty()) {
                issues.push(ValidationIssue::EmptyGuard {
                    step_id: step.id.clone(),
                });
            }
        }

        for relocation in &self.relocations {
            if relocation.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: None,
                    field: "id",
                });
            }
            if relocation.destination.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: Some(relocation.id.clone()),
                    field: "destination",
                });
            }
            if relocation.candidates.is_empty() && relocation.name_tokens.is_empty() {
                issues.push(ValidationIssue::UnfindableRelocation {
                    step_id: relocation.id.clone(),
                });
            }
            if relocation.extension.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: Some(relocation.id.clone()),
                    field: "extension",
                });
            }
        }

        if let Some(migration) = &self.migration {
            if migration.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: None,
                    field: "id",
                });
            }
            if migration.statement.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: Some(migration.id.clone()),
                    field: "statement",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyFile,
    MissingField {
        step_id: Option<String>,
        field: &'static str,
    },
    EmptyAnchorChain {
        step_id: String,
    },
    EmptyGuard {
        step_id: String,
    },
    UnfindableRelocation {
        step_id: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyFile => {
                write!(f, "steps file declares no relocations, steps, or migration")
            }
            ValidationIssue::MissingField { step_id, field } => match step_id {
                Some(id) => write!(f, "step '{id}' missing required field '{field}'"),
                None => write!(f, "step missing required field '{field}'"),
            },
            ValidationIssue::EmptyAnchorChain { step_id } => {
                write!(f, "step '{step_id}' declares no anchor candidates")
            }
            ValidationIssue::EmptyGuard { step_id } => {
                write!(f, "step '{step_id}' has a guard with no needles")
            }
            ValidationIssue::UnfindableRelocation { step_id } => {
                write!(
                    f,
                    "relocation '{step_id}' has neither ranked candidates nor name tokens"
                )
            }
        }
    }
}
