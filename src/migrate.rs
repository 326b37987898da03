//! Single schema-administration step.
//!
//! One step per run may issue an idempotent SQL statement (conditional
//! column addition, guarded UPDATE batch) through the external `psql`
//! client. The statement itself must be re-runnable (`IF NOT EXISTS`
//! style), so the engine applies no guard of its own here. When no
//! connection string or no client binary is available the statement is
//! spooled to a standalone file for manual execution instead; that is a
//! documented degraded mode, not a failure.

use crate::config::MigrationDef;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on the one blocking external call.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the schema step concluded (both variants are successes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Statement executed against the database.
    Executed,
    /// Statement written to disk for manual execution (root-relative path).
    Spooled { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("schema client exited with status {code}: {stderr}")]
    ClientFailed { code: i32, stderr: String },

    #[error("schema client did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Run the schema step: execute via `psql` when a connection string and the
/// client are available, otherwise spool the statement to
/// `<root>/<spool_file>`.
pub fn execute(def: &MigrationDef, root: &Path) -> Result<MigrationOutcome, MigrationError> {
    let url = match database_url(root) {
        Some(url) => url,
        None => return spool(def, root),
    };

    match run_client(&url, &def.statement) {
        ClientResult::Finished { code: 0, .. } => Ok(MigrationOutcome::Executed),
        ClientResult::Finished { code, stderr } => Err(MigrationError::ClientFailed { code, stderr }),
        ClientResult::TimedOut => Err(MigrationError::TimedOut(CLIENT_TIMEOUT)),
        ClientResult::Unavailable => spool(def, root),
        ClientResult::Io(source) => Err(MigrationError::Io {
            path: PathBuf::from("psql"),
            source,
        }),
    }
}

/// Write the statement to the spool file for manual execution.
pub fn spool(def: &MigrationDef, root: &Path) -> Result<MigrationOutcome, MigrationError> {
    let rel = PathBuf::from(&def.spool_file);
    let path = root.join(&rel);
    fs::write(&path, &def.statement).map_err(|source| MigrationError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(MigrationOutcome::Spooled { path: rel })
}

/// Connection string: `DATABASE_URL` env var first, then a
/// `DATABASE_URL=` line in the project's `.env` file.
pub fn database_url(root: &Path) -> Option<String> {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.is_empty() {
            return Some(url);
        }
    }
    let env_file = root.join(".env");
    let contents = fs::read_to_string(env_file).ok()?;
    parse_env_file(&contents)
}

fn parse_env_file(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("DATABASE_URL=") {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

enum ClientResult {
    Finished { code: i32, stderr: String },
    TimedOut,
    Unavailable,
    Io(std::io::Error),
}

/// Spawn `psql -v ON_ERROR_STOP=1 -c <statement>` and poll it up to
/// [`CLIENT_TIMEOUT`], killing it on expiry.
fn run_client(url: &str, statement: &str) -> ClientResult {
    let spawned = Command::new("psql")
        .arg(url)
        .args(["-v", "ON_ERROR_STOP=1", "-c"])
        .arg(statement)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ClientResult::Unavailable,
        Err(e) => return ClientResult::Io(e),
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                return ClientResult::Finished {
                    code: status.code().unwrap_or(-1),
                    stderr: stderr.trim().to_string(),
                };
            }
            Ok(None) => {
                if started.elapsed() >= CLIENT_TIMEOUT {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ClientResult::TimedOut;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return ClientResult::Io(e),
        }
    }
}
