//! testgen: generate, update and check pytest suites against a ReqIF export.
//!
//! - `testgen parse spec.reqif [--json]`
//! - `testgen generate spec.reqif tests/`
//! - `testgen update spec.reqif tests/ [--ignore-file tests/.typhoonignore]`
//! - `testgen coverage spec.reqif tests/ [ignore-file]`
//! - `testgen upload [--results-dir allure-html] [--server-url URL]`

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use testgen::diff::CoverageReport;
use testgen::ignore::{IgnoreFile, IgnoreMatcher, DEFAULT_IGNORE_FILE};
use testgen::model::{NodeId, SpecDocument, SpecForest};
use testgen::parser;
use testgen::settings::Settings;
use testgen::structure::{existing, expected};
use testgen::sync::{SyncReport, Synchronizer};
use testgen::upload::ReportSession;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "testgen",
    version,
    about = "Generate and synchronize pytest stubs from ReqIF requirement exports"
)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the specification forest of a ReqIF file
    Parse {
        reqif: PathBuf,

        /// Print JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },

    /// Generate a test tree; existing files are reconciled, not overwritten
    Generate { reqif: PathBuf, out_dir: PathBuf },

    /// Synchronize an existing test tree with the specification
    Update {
        reqif: PathBuf,
        tests_dir: PathBuf,

        /// Ignore file (default: <tests_dir>/.typhoonignore if present)
        #[arg(long)]
        ignore_file: Option<PathBuf>,
    },

    /// Print a JSON coverage report comparing the tree with the specification
    Coverage {
        reqif: PathBuf,
        tests_dir: PathBuf,
        ignore_file: Option<PathBuf>,
    },

    /// Archive the Allure results directory and upload it
    Upload {
        /// Results directory [env: ALLURE_RESULTS_DIR]
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Upload endpoint [env: SERVER_URL]
        #[arg(long)]
        server_url: Option<String>,

        /// Upload timeout in seconds [env: UPLOAD_TIMEOUT_SECS]
        #[arg(long)]
        timeout: Option<u64>,

        /// Where the archive is written
        #[arg(long, default_value = ".")]
        archive_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Parse { reqif, json } => parse_cmd(&reqif, json),
        Command::Generate { reqif, out_dir } => generate_cmd(&reqif, &out_dir),
        Command::Update {
            reqif,
            tests_dir,
            ignore_file,
        } => update_cmd(&reqif, &tests_dir, ignore_file.as_deref()),
        Command::Coverage {
            reqif,
            tests_dir,
            ignore_file,
        } => coverage_cmd(&reqif, &tests_dir, ignore_file.as_deref()),
        Command::Upload {
            results_dir,
            server_url,
            timeout,
            archive_dir,
        } => upload_cmd(results_dir, server_url, timeout, &archive_dir),
    }
}

/// Logs go to stderr so stdout stays clean for JSON. `RUST_LOG` wins over flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("testgen={},warn", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .init();
}

fn load_spec(reqif: &Path) -> Result<SpecDocument> {
    if !reqif.is_file() {
        bail!("ReqIF file '{}' does not exist", reqif.display());
    }
    let doc = parser::parse_file(reqif);
    if !doc.diagnostics.is_empty() {
        warn!(
            file = %reqif.display(),
            problems = doc.diagnostics.len(),
            "specification parsed with problems"
        );
    }
    Ok(doc)
}

fn require_dir(dir: &Path, what: &str) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} '{}' does not exist", what, dir.display());
    }
    Ok(())
}

fn parse_cmd(reqif: &Path, json: bool) -> Result<()> {
    let doc = load_spec(reqif)?;
    if json {
        let out = serde_json::json!({
            "header": doc.header,
            "nodes": doc.forest.to_json(),
            "diagnostics": doc.diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if let Some(title) = &doc.header.title {
        println!("# {}", title);
    }
    for &root in doc.forest.roots() {
        print_tree(&doc.forest, root, 0);
    }
    for problem in &doc.diagnostics {
        eprintln!("warning: {}", problem);
    }
    Ok(())
}

fn print_tree(forest: &SpecForest, id: NodeId, depth: usize) {
    let node = forest.node(id);
    println!("{}{} {}: {}", "  ".repeat(depth), node.kind, node.id, node.label);
    for &child in node.children() {
        print_tree(forest, child, depth + 1);
    }
}

fn print_summary(report: &SyncReport) {
    println!(
        "{} folders created, {} files created, {} updated, {} unchanged, {} ignored",
        report.folders_created.len(),
        report.files_created.len(),
        report.files_updated.len(),
        report.files_unchanged.len(),
        report.ignored.len()
    );
}

fn generate_cmd(reqif: &Path, out_dir: &Path) -> Result<()> {
    let doc = load_spec(reqif)?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory: {}", out_dir.display()))?;

    let report = Synchronizer::new(&doc, out_dir).run()?;
    print_summary(&report);
    Ok(())
}

/// Explicit ignore file, or the default one in `tests_dir` when present.
fn resolve_ignore(tests_dir: &Path, explicit: Option<&Path>) -> Result<Option<IgnoreFile>> {
    let path = match explicit {
        Some(path) if !path.is_file() => bail!("ignore file '{}' does not exist", path.display()),
        Some(path) => path.to_path_buf(),
        None => {
            let default = tests_dir.join(DEFAULT_IGNORE_FILE);
            if !default.is_file() {
                return Ok(None);
            }
            default
        }
    };
    let ignore = IgnoreFile::load(&path)?;
    info!(file = %path.display(), empty = ignore.is_empty(), "ignore file loaded");
    Ok(Some(ignore))
}

fn update_cmd(reqif: &Path, tests_dir: &Path, ignore_file: Option<&Path>) -> Result<()> {
    require_dir(tests_dir, "tests directory")?;
    let doc = load_spec(reqif)?;
    let ignore = resolve_ignore(tests_dir, ignore_file)?;

    let mut sync = Synchronizer::new(&doc, tests_dir);
    if let Some(ignore) = &ignore {
        sync = sync.with_ignore(ignore);
    }
    let report = sync.run()?;
    print_summary(&report);
    Ok(())
}

fn coverage_cmd(reqif: &Path, tests_dir: &Path, ignore_file: Option<&Path>) -> Result<()> {
    require_dir(tests_dir, "tests directory")?;
    let doc = load_spec(reqif)?;

    let ignore = match ignore_file {
        Some(path) if path.is_file() => Some(IgnoreFile::load(path)?),
        Some(path) => {
            warn!(file = %path.display(), "ignore file not found, nothing ignored");
            None
        }
        None => None,
    };
    let matcher = ignore.as_ref().map(|m| m as &dyn IgnoreMatcher);

    let on_disk = existing::extract(tests_dir, matcher)?;
    let mut wanted = expected::derive(&doc);
    if let Some(matcher) = matcher {
        wanted = wanted.without_ignored(tests_dir, matcher);
    }

    let report = CoverageReport::new(&on_disk, &wanted);
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn upload_cmd(
    results_dir: Option<PathBuf>,
    server_url: Option<String>,
    timeout: Option<u64>,
    archive_dir: &Path,
) -> Result<()> {
    let mut settings = Settings::load()?;
    if let Some(dir) = results_dir {
        settings.results_dir = dir;
    }
    if let Some(url) = server_url {
        settings.server_url = url;
    }
    if let Some(secs) = timeout {
        settings.upload_timeout = Duration::from_secs(secs);
    }

    let session = ReportSession::open(&settings.results_dir)?;
    require_dir(archive_dir, "archive directory")?;
    let archive = session.write_archive(archive_dir)?;
    session
        .upload(&archive, &settings.server_url, settings.upload_timeout)
        .with_context(|| format!("archive kept at {}", archive.display()))?;
    println!("uploaded {} to {}", session.archive_name(), settings.server_url);
    Ok(())
}
