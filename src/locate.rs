//! Best-effort discovery of misplaced artifacts.
//!
//! A build step sometimes leaves a file where nothing serves it (a browser
//! script dropped into `routes/`, say). The locator probes a ranked list of
//! guessed paths first, then falls back to a recursive scan of the project
//! tree, and copies (never moves) the find to its canonical destination.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Dependency/vendor subtrees excluded from the recursive fallback scan.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "vendor", "target"];

/// Ranked guesses plus the name predicate for the fallback scan.
///
/// Ranked paths are tried in strict declared order; the recursive scan runs
/// only when none of them exist. The name predicate is case-insensitive:
/// every token must appear in the file name and the extension must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    /// Root-relative guessed paths, most likely first.
    pub ranked: Vec<PathBuf>,
    /// Tokens that must all appear in the file name (case-insensitive).
    pub name_tokens: Vec<String>,
    /// Required file extension, without the dot.
    pub extension: String,
}

/// How a relocation concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    /// Destination already exists; nothing to do.
    AlreadyInPlace,
    /// Source found and copied to the destination (root-relative source).
    Copied { source: PathBuf },
}

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("not found at any ranked path ({ranked} tried) nor by scanning for {predicate}")]
    NotFound { ranked: usize, predicate: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Locate a misplaced artifact and copy it to `destination`.
///
/// Rank order is strict: the recursive scan never runs while any ranked
/// candidate exists. The copy is additive: the original stays where it was.
/// With `dry_run` the source is resolved but nothing is written.
pub fn relocate(
    root: &Path,
    destination: &Path,
    set: &CandidateSet,
    dry_run: bool,
) -> Result<LocateOutcome, LocateError> {
    let dest = root.join(destination);
    if dest.exists() {
        return Ok(LocateOutcome::AlreadyInPlace);
    }

    let source = find_source(root, set)?;

    if !dry_run {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| LocateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::copy(&source, &dest).map_err(|e| LocateError::Io {
            path: dest.clone(),
            source: e,
        })?;
    }

    let relative = source.strip_prefix(root).unwrap_or(&source).to_path_buf();
    Ok(LocateOutcome::Copied { source: relative })
}

fn find_source(root: &Path, set: &CandidateSet) -> Result<PathBuf, LocateError> {
    // Strategy 1: ranked guesses, first hit wins.
    for candidate in &set.ranked {
        let path = root.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }

    // Strategy 2: recursive scan, skipping vendor subtrees.
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !(entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
    });

    for entry in walker.flatten() {
        if entry.file_type().is_file() && name_matches(entry.file_name().to_string_lossy().as_ref(), set) {
            return Ok(entry.path().to_path_buf());
        }
    }

    Err(LocateError::NotFound {
        ranked: set.ranked.len(),
        predicate: format!(
            "name containing {:?} with .{} extension",
            set.name_tokens, set.extension
        ),
    })
}

/// Case-insensitive multi-token-and-extension check on a bare file name.
fn name_matches(file_name: &str, set: &CandidateSet) -> bool {
    if set.name_tokens.is_empty() {
        return false;
    }
    let lower = file_name.to_lowercase();
    let suffix = format!(".{}", set.extension.to_lowercase());
    lower.ends_with(&suffix)
        && set
            .name_tokens
            .iter()
            .all(|token| lower.contains(&token.to_lowercase()))
}
