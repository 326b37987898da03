//! Site Patcher: idempotent maintenance patching for web application
//! source artifacts.
//!
//! # Architecture
//!
//! Every mutation compiles down to one primitive: a literal anchor matched
//! by verbatim containment, with a payload spliced at the match. Steps are
//! declarative ordered data (`{id, artifact, guard, anchors[]}` tables
//! loaded from TOML), so adding a fallback anchor never touches
//! orchestration control flow.
//!
//! # Safety
//!
//! - An idempotency guard runs before any matching; re-running is a no-op
//! - Replacement content is computed fully in memory before any write
//! - Atomic file writes (tempfile + fsync + rename)
//! - Per-step failure isolation: a broken anchor never aborts the run
//! - Artifact selectors cannot escape the project root
//!
//! # Example
//!
//! ```no_run
//! use site_patcher::{config, runner, RunMode};
//! use std::path::Path;
//!
//! let steps = config::load_from_path("steps/recommended-events.toml")?;
//! let report = runner::run(&steps, Path::new("/srv/app"), RunMode::Apply);
//!
//! for failure in report.failures() {
//!     eprintln!("{failure}");
//! }
//! # Ok::<(), site_patcher::config::ConfigError>(())
//! ```

pub mod anchor;
pub mod config;
pub mod guard;
pub mod locate;
pub mod migrate;
pub mod report;
pub mod runner;

// Re-exports
pub use anchor::{AnchorCandidate, AnchorSpec, MatchError, Placement, ResolvedEdit};
pub use config::{load_from_path, load_from_str, ConfigError, StepsFile};
pub use guard::{GuardError, Predicate};
pub use locate::{CandidateSet, LocateError, LocateOutcome};
pub use migrate::{MigrationError, MigrationOutcome};
pub use report::{AppliedDetail, ApplyResult, Report, RunStatus, StepOutcome};
pub use runner::{RunMode, StepError};
