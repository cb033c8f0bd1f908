//! Codeflow corpus generator CLI
//!
//! Loads a seed document, generates a corpus for a date range and writes the
//! research dataset.

use chrono::NaiveDate;
use clap::Parser;
use codeflow_core::{SeedDocument, Store};
use codeflow_env::{CancelToken, RunContext, SimResult, TimeWindow, TracingSink};
use codeflow_sim::{Engine, EngineConfig, ExportFormat, GenerationStats, Velocity};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Codeflow synthetic SDLC corpus generator
#[derive(Parser, Debug)]
#[command(name = "codeflow-sim")]
#[command(about = "Generate a deterministic software-delivery corpus and research dataset", long_about = None)]
struct Args {
    /// Seed document (.json or .toml)
    #[arg(short = 'f', long)]
    seed_file: PathBuf,

    /// First day of the window (YYYY-MM-DD)
    #[arg(long, default_value = "2026-01-05")]
    start: NaiveDate,

    /// Number of days to generate
    #[arg(short, long, default_value = "30")]
    days: u32,

    /// Velocity profile (low, medium, high)
    #[arg(short, long, default_value = "medium")]
    velocity: Velocity,

    /// Dataset format (csv, json, ndjson)
    #[arg(long, default_value = "csv")]
    format: ExportFormat,

    /// Dataset output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resize the roster to this many developers, cloning as needed
    #[arg(long)]
    developers: Option<usize>,

    /// Abort generation after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log per-band summaries after generation
    #[arg(long)]
    bands: bool,

    /// Verbose output
    #[arg(long)]
    verbose: bool,

    /// JSON run summary
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            if e.is_configuration() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(args: &Args) -> SimResult<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let mut seed = SeedDocument::from_path(&args.seed_file)?;
    if let Some(n) = args.developers {
        seed = seed.replicate_developers(n)?;
    }

    info!("Codeflow corpus generator v{}", env!("CARGO_PKG_VERSION"));
    let sink = Arc::new(TracingSink);
    let mut engine = Engine::new(Store::shared(), config).with_events(sink.clone());
    engine.load(seed)?;

    let window = TimeWindow::from_days(args.start, args.days);
    let cancel = match args.timeout_secs {
        Some(secs) => CancelToken::new().with_timeout(std::time::Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let ctx = RunContext::new(cancel, sink);
    info!(window = %window, velocity = %args.velocity, "generating");
    let stats = engine.generate(window, args.velocity, &ctx)?;

    let rows = match &args.output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            let n = engine.dataset(window, args.format, &mut out)?;
            out.flush()?;
            info!(rows = n, path = %path.display(), "dataset written");
            n
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            engine.dataset(window, args.format, &mut out)?
        }
    };

    let bands = if args.bands {
        let bands = engine.band_summaries(window)?;
        for b in &bands {
            info!(
                band = %b.band,
                commits = b.commits,
                prs = b.pull_requests,
                lead_time_h = b.mean_coding_lead_time_hours.unwrap_or_default(),
                comments_per_pr = b.mean_review_comments.unwrap_or_default(),
                revert_rate = b.revert_rate.unwrap_or_default(),
                survival_30d = ?b.mean_survival_30d,
                "band summary"
            );
        }
        Some(bands)
    } else {
        None
    };

    if args.json {
        print_summary(args, &stats, rows, bands.as_deref())?;
    } else {
        let survival = stats
            .mean_survival_30d
            .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"));
        info!(
            "✓ {} commits, {} PRs ({} merged, {} reverted), {} review comments, mean 30d survival {}",
            stats.commits,
            stats.pull_requests,
            stats.merged_prs,
            stats.reverted_prs,
            stats.review_comments,
            survival
        );
    }
    Ok(())
}

/// Writes the JSON summary to stdout, or to stderr when stdout carries the
/// dataset.
fn print_summary(
    args: &Args,
    stats: &GenerationStats,
    rows: usize,
    bands: Option<&[codeflow_sim::BandSummary]>,
) -> SimResult<()> {
    let summary = serde_json::json!({
        "stats": stats,
        "rows": rows,
        "format": args.format.name(),
        "velocity": args.velocity.name(),
        "bands": bands,
    });
    let text =
        serde_json::to_string_pretty(&summary).map_err(codeflow_env::SimError::serialization)?;
    if args.output.is_some() {
        println!("{text}");
    } else {
        eprintln!("{text}");
    }
    Ok(())
}
