//! diffmap CLI - explain a diff with the smallest coherent context.
//!
//! Orchestrates the full pipeline against a git repository:
//!
//! 1. Git driver: parse the diff range into hunks and snapshots
//! 2. Fragmenter: split files into semantic fragments
//! 3. Universe: expand to plausibly relevant fragments
//! 4. Edges + PPR: rank by relevance to the change
//! 5. Selector: lazy-greedy pick under the token budget
//! 6. Rendering: JSON or plain text on stdout
//!
//! Exit codes: 0 on success, 2 for an empty diff, 1 for errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use owo_colors::OwoColorize;

use diffmap::{git, render, DiffmapConfig, DiffmapError, PipelineInput};

/// Diff-aware context selection
///
/// Examples:
///   diffmap                          # working tree vs HEAD
///   diffmap main..feature            # branch diff
///   diffmap --budget 8000 --stats    # budgeted, with a summary
#[derive(Parser, Debug)]
#[command(name = "diffmap")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Diff range (a revision, or base..head)
    #[arg(value_name = "RANGE", default_value = "HEAD")]
    range: String,

    /// Repository root
    #[arg(short = 'C', long, default_value = ".")]
    root: PathBuf,

    /// Token budget for the selection. Without it, adaptive stopping
    /// alone controls the output size.
    #[arg(short, long)]
    budget: Option<usize>,

    /// PPR damping factor
    #[arg(long, default_value = "0.60")]
    alpha: f64,

    /// Adaptive stopping threshold (0 disables)
    #[arg(long, default_value = "0.08")]
    tau: f64,

    /// Skip selection and emit every fragment of the changed files
    #[arg(long)]
    full: bool,

    /// Cap on the candidate universe size
    #[arg(long, default_value = "5000")]
    max_universe: usize,

    /// Overall time limit in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Omit fragment contents from the output (locations only)
    #[arg(long)]
    no_content: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Print a run summary to stderr
    #[arg(long)]
    stats: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "diffmap=warn",
        1 => "diffmap=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let started = Instant::now();

    if !git::is_git_repo(&cli.root) {
        anyhow::bail!("'{}' is not a git repository", cli.root.display());
    }

    let config = DiffmapConfig {
        alpha: cli.alpha,
        tau: cli.tau,
        budget: cli.budget,
        full: cli.full,
        max_universe: cli.max_universe,
        deadline: cli.deadline_ms.map(|ms| started + Duration::from_millis(ms)),
        ..Default::default()
    }
    .with_overrides_from(&cli.root);

    let hunks = git::diff_hunks(&cli.root, &cli.range).context("parsing the diff")?;
    let files = git::read_changed_files(&cli.root, &cli.range).context("reading snapshots")?;
    let history = git::recent_commits(&cli.root, config.history.commits_limit).ok();

    let input = PipelineInput {
        files,
        hunks,
        history,
        repo_root: Some(cli.root.clone()),
    };

    let report = match diffmap::run(&input, &config) {
        Ok(report) => report,
        Err(DiffmapError::EmptyDiff) => {
            eprintln!("{}", "empty diff, nothing to select".yellow());
            return Ok(ExitCode::from(2));
        }
        Err(err) => return Err(err.into()),
    };

    let root_name = cli
        .root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "repository".to_string());

    match cli.format {
        OutputFormat::Json => {
            let value = render::to_json(&report, &root_name, !cli.no_content);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            print!("{}", render::to_text(&report, !cli.no_content));
        }
    }

    if cli.stats {
        let meta = &report.metadata;
        eprintln!();
        eprintln!("{}", "diffmap run".bold());
        eprintln!("  fragments:  {}", report.selected.len().to_string().cyan());
        eprintln!("  universe:   {}", meta.universe_size);
        eprintln!("  edges:      {}", meta.edge_count);
        eprintln!("  ppr iters:  {}", meta.ppr_iterations);
        eprintln!("  stopped by: {}", meta.reason.as_str().green());
        eprintln!("  tokens:     {}", meta.used_tokens);
        eprintln!("  elapsed:    {:.1?}", started.elapsed());
    }

    Ok(ExitCode::SUCCESS)
}
