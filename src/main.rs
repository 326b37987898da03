use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use site_patcher::report::{AppliedDetail, ApplyResult, Report, RunStatus, StepOutcome};
use site_patcher::{config, runner, RunMode, StepsFile};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "site-patcher")]
#[command(about = "Idempotent anchor-based patching for web application artifacts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the web app project root (auto-detected if not specified)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Specific steps file to run (otherwise runs all in steps/)
    #[arg(short, long, global = true)]
    steps: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all configured steps (the default when no command is given)
    Apply {
        /// Evaluate steps without modifying any file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report what a run would do, without writing
    Status,

    /// List configured steps
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Apply {
        dry_run: false,
        diff: false,
    }) {
        Commands::Apply { dry_run, diff } => cmd_apply(cli.root, cli.steps, dry_run, diff),
        Commands::Status => cmd_status(cli.root, cli.steps),
        Commands::List => cmd_list(cli.root, cli.steps),
    }
}

/// Resolve the artifact root using multiple detection strategies.
///
/// Priority order:
/// 1. Explicit --root flag
/// 2. SITE_PATCHER_ROOT environment variable
/// 3. Walk up from the current directory looking for the web app markers
///    (`server.js` plus a `public/` directory)
///
/// Failure here is the fatal precondition: nothing runs without a root.
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_root {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_path) = env::var("SITE_PATCHER_ROOT") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: SITE_PATCHER_ROOT is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    if let Some(path) = auto_detect_root() {
        println!(
            "{}",
            format!("Auto-detected project root: {}", path.display()).dimmed()
        );
        return Ok(path);
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}\n  {}",
        "Could not find the web app project root.".red(),
        "Try one of:".bold(),
        "1. cd into the project directory (the one with server.js and public/) and re-run",
        "2. Specify explicitly: site-patcher --root /path/to/app",
        "3. Set environment variable: export SITE_PATCHER_ROOT=/path/to/app"
    )
}

/// Walk up from the current directory looking for the app's markers.
fn auto_detect_root() -> Option<PathBuf> {
    let current = env::current_dir().ok()?;

    for ancestor in current.ancestors() {
        let has_server = ancestor.join("server.js").is_file();
        let has_public = ancestor.join("public").is_dir();

        if has_server && has_public {
            return Some(ancestor.to_path_buf());
        }
    }

    None
}

/// Discover all .toml steps files.
///
/// Discovery order:
/// 1. `<root>/steps` (steps kept alongside the target app).
/// 2. `./steps` relative to the current working directory (typical when
///    running from the site-patcher repo).
fn discover_steps_files(root: &Path) -> Result<Vec<PathBuf>> {
    let cwd_steps_dir = env::current_dir().ok().map(|cwd| cwd.join("steps"));
    let root_steps_dir = root.join("steps");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(root_steps_dir)
        .chain(cwd_steps_dir)
        .collect();

    for steps_dir in candidate_dirs {
        if !steps_dir.exists() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&steps_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml steps files found in either ./steps or {}/steps",
        root.display()
    )
}

fn load_all(
    root: &Path,
    steps: Option<PathBuf>,
) -> Result<Vec<(PathBuf, StepsFile)>> {
    let paths = if let Some(path) = steps {
        vec![path]
    } else {
        discover_steps_files(root)?
    };

    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        let file = config::load_from_path(&path)?;
        loaded.push((path, file));
    }
    Ok(loaded)
}

/// Show unified diff between original and patched artifact content.
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_result(result: &ApplyResult, dry_run: bool) {
    match &result.outcome {
        StepOutcome::Applied { detail } => {
            let line = match detail {
                AppliedDetail::Spliced { anchor_index, .. } if *anchor_index > 0 => format!(
                    "{}: {} {} (via fallback anchor #{})",
                    result.step_id,
                    if dry_run { "would apply to" } else { "applied to" },
                    result.artifact.display(),
                    anchor_index
                ),
                AppliedDetail::Spliced { .. } => format!(
                    "{}: {} {}",
                    result.step_id,
                    if dry_run { "would apply to" } else { "applied to" },
                    result.artifact.display()
                ),
                AppliedDetail::Relocated { source } => format!(
                    "{}: {} {} -> {}",
                    result.step_id,
                    if dry_run { "would copy" } else { "copied" },
                    source.display(),
                    result.artifact.display()
                ),
                AppliedDetail::Executed => {
                    format!("{}: schema statement executed", result.step_id)
                }
                AppliedDetail::Spooled { path } => format!(
                    "{}: schema statement spooled to {}",
                    result.step_id,
                    path.display()
                ),
            };
            println!("{} {}", "✓".green(), line);
        }
        StepOutcome::Skipped => {
            println!(
                "{} {}: already applied ({})",
                "⊘".yellow(),
                result.step_id,
                result.artifact.display()
            );
        }
        StepOutcome::Failed { reason } => {
            eprintln!("{} {}: failed - {}", "✗".red(), result.step_id, reason);
            eprintln!("  Artifact: {}", result.artifact.display());
        }
    }
}

fn cmd_apply(
    root: Option<PathBuf>,
    steps: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    let loaded = load_all(&root, steps)?;

    println!("Project root: {}", root.display());
    println!();

    let mode = if dry_run { RunMode::Check } else { RunMode::Apply };
    let mut combined = Report::default();

    for (path, file) in &loaded {
        println!("Running steps from {}...", path.display());
        if dry_run {
            println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
        }

        // Snapshot artifact contents before applying, for diff output. Only
        // the artifacts this file targets are read.
        let mut before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff && !dry_run {
            for step in &file.steps {
                let artifact = root.join(&step.artifact);
                if artifact.exists() {
                    if let Ok(content) = fs::read_to_string(&artifact) {
                        before.insert(artifact, content);
                    }
                }
            }
        }

        let report = runner::run(file, &root, mode);

        for result in &report.results {
            print_result(result, dry_run);

            if show_diff && !dry_run && result.outcome.is_applied() {
                let artifact = root.join(&result.artifact);
                if let Some(original) = before.get(&artifact) {
                    if let Ok(patched) = fs::read_to_string(&artifact) {
                        if original != &patched {
                            display_diff(&result.artifact, original, &patched);
                        }
                    }
                }
            }
        }

        for diagnostic in &report.diagnostics {
            println!("  {}", diagnostic.dimmed());
        }

        combined.results.extend(report.results);
        combined.diagnostics.extend(report.diagnostics);
        println!();
    }

    // Summary
    println!("{}", "Summary:".bold());
    println!(
        "  {} applied",
        format!("{}", combined.applied_count()).green()
    );
    println!(
        "  {} skipped",
        format!("{}", combined.skipped_count()).yellow()
    );
    println!("  {} failed", format!("{}", combined.failed_count()).red());
    println!();

    match combined.status() {
        RunStatus::Full => println!("{}", "All steps applied.".green().bold()),
        RunStatus::Partial => {
            println!(
                "{}",
                format!(
                    "Partially applied: {} step(s) need manual attention.",
                    combined.failed_count()
                )
                .yellow()
                .bold()
            );
        }
        RunStatus::NoneApplied => println!("{}", "No steps applied.".red().bold()),
    }

    if combined.failed_count() > 0 {
        for failure in combined.failures() {
            eprintln!("  {}", failure);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(root: Option<PathBuf>, steps: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let loaded = load_all(&root, steps)?;

    println!("{}", "Step Status Report".bold());
    println!("Project root: {}", root.display());
    println!();

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut failed = Vec::new();

    for (_, file) in &loaded {
        // Check mode is read-only; "applied" here means the guard already
        // sees the step's effect.
        let report = runner::run(file, &root, RunMode::Check);

        for result in report.results {
            match result.outcome {
                StepOutcome::Skipped => applied.push(result.step_id),
                StepOutcome::Applied { .. } => pending.push(result.step_id),
                StepOutcome::Failed { ref reason } => {
                    failed.push((result.step_id.clone(), reason.clone()));
                }
            }
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} steps)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} steps)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            pending.len()
        );
        for id in &pending {
            println!("  - {}", id);
        }
        println!();
    }

    if !failed.is_empty() {
        println!(
            "{} {} ({} steps)",
            "✗".red(),
            "UNRESOLVABLE".red().bold(),
            failed.len()
        );
        for (id, reason) in &failed {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_list(root: Option<PathBuf>, steps: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let loaded = load_all(&root, steps)?;

    for (path, file) in &loaded {
        println!("{}", path.display().to_string().bold());
        if let Some(description) = &file.meta.description {
            println!("  {}", description.dimmed());
        }

        for relocation in &file.relocations {
            println!(
                "  {} {} -> {}",
                "[relocate]".cyan(),
                relocation.id,
                relocation.destination
            );
        }

        for step in &file.steps {
            println!(
                "  {} {} on {} ({} anchor{})",
                "[patch]".cyan(),
                step.id,
                step.artifact,
                step.anchors.len(),
                if step.anchors.len() == 1 { "" } else { "s" }
            );
        }

        if let Some(migration) = &file.migration {
            println!("  {} {}", "[migration]".cyan(), migration.id);
        }

        println!();
    }

    Ok(())
}
