//! `parcel-enrich run`: process the input table against the live site.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;

use parcel_enrich::batch::{
    BatchRunner, ColumnNames, CsvSink, FileCheckpoint, InputTable, Pacing, RowSink, RunOptions,
};
use parcel_enrich::config::{self, DEFAULT_ADDRESS_COLUMN, DEFAULT_JURISDICTION_COLUMN};
use parcel_enrich::driver::chromium::{find_chromium, ChromiumFactory, ChromiumOptions};
use parcel_enrich::events::{self, BatchEventKind, EventReceiver};
use parcel_enrich::runlog::RunLog;

#[derive(Args)]
pub struct RunArgs {
    /// Input CSV with address and jurisdiction columns
    pub input: PathBuf,

    /// Output CSV; created with a header, or appended to when it exists
    pub output: PathBuf,

    /// Checkpoint file (default: <output>.checkpoint)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Per-row JSONL run log (default: <output>.runlog.jsonl)
    #[arg(long)]
    pub runlog: Option<PathBuf>,

    /// Skip the run log
    #[arg(long)]
    pub no_runlog: bool,

    /// Site profile JSON (env: PARCEL_ENRICH_PROFILE)
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Input column holding the street address
    #[arg(long, default_value = DEFAULT_ADDRESS_COLUMN)]
    pub address_column: String,

    /// Input column holding the county / jurisdiction
    #[arg(long, default_value = DEFAULT_JURISDICTION_COLUMN)]
    pub jurisdiction_column: String,

    /// Valuation years to track, comma separated (default: the last five)
    #[arg(long, value_delimiter = ',')]
    pub years: Option<Vec<i32>>,

    /// Lower bound of the random pause between rows
    #[arg(long, default_value = "2000")]
    pub pace_min_ms: u64,

    /// Upper bound of the random pause between rows (0 with --pace-min-ms 0 disables pacing)
    #[arg(long, default_value = "5000")]
    pub pace_max_ms: u64,

    /// Attempt at most this many rows, then stop
    #[arg(long)]
    pub limit: Option<usize>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Chromium executable (env: PARCEL_ENRICH_CHROMIUM_PATH)
    #[arg(long)]
    pub chromium: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Run the batch and print a summary.
pub async fn run(args: RunArgs) -> Result<()> {
    let profile = config::load_profile(args.profile.as_deref()).context("loading site profile")?;

    let columns = ColumnNames {
        address: args.address_column.clone(),
        jurisdiction: args.jurisdiction_column.clone(),
    };
    let table = InputTable::read(&args.input, &columns)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let years = match args.years.clone() {
        Some(years) if !years.is_empty() => config::normalize_years(years),
        _ => config::default_years(),
    };
    let mut sink = CsvSink::open(&args.output, table.headers(), &years)
        .with_context(|| format!("opening {}", args.output.display()))?;

    let checkpoint_path = config::checkpoint_path(&args.output, args.checkpoint.as_deref());
    let checkpoint = FileCheckpoint::new(&checkpoint_path);

    let executable = args.chromium.clone().or_else(find_chromium);
    if executable.is_none() {
        tracing::warn!("no Chromium binary found; pass --chromium or set PARCEL_ENRICH_CHROMIUM_PATH");
    }
    let factory = ChromiumFactory::new(ChromiumOptions {
        executable,
        headless: !args.headful,
        ..ChromiumOptions::default()
    });

    let options = RunOptions {
        limit: args.limit,
        pacing: Pacing::from_millis(args.pace_min_ms, args.pace_max_ms),
    };

    let (tx, rx) = events::channel();
    let mut runner = BatchRunner::new(Arc::new(factory), Box::new(checkpoint), Arc::new(profile), options)?
        .with_events(tx);

    if !args.no_runlog {
        let path = config::runlog_path(&args.output, args.runlog.as_deref());
        match RunLog::open(&path) {
            Ok(log) => runner = runner.with_runlog(log),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "run log disabled"),
        }
    }

    tracing::info!(
        run_id = runner.run_id(),
        input = %args.input.display(),
        output = %args.output.display(),
        checkpoint = %checkpoint_path.display(),
        years = ?sink.years(),
        "starting run"
    );

    let progress = if args.no_progress {
        drop(rx);
        None
    } else {
        Some(tokio::spawn(render_progress(rx)))
    };

    let result = runner.run(&table, &mut sink).await;
    // Dropping the runner closes the event channel and ends the renderer.
    drop(runner);
    if let Some(handle) = progress {
        let _ = handle.await;
    }
    let summary = result?;

    println!();
    println!("Run {}", summary.run_id);
    println!("  Rows in input:    {}", summary.total_rows);
    println!("  Started at row:   {}", summary.start_row);
    println!("  Attempted:        {}", summary.attempted);
    println!("  Succeeded:        {}", summary.succeeded);
    println!("  Partial:          {}", summary.partial);
    println!("  Failed:           {}", summary.failed);
    println!("  Session rebuilds: {}", summary.session_rebuilds);
    println!("  Next row:         {}", summary.next_row);
    println!("  Elapsed:          {:.1}s", summary.elapsed.as_secs_f64());
    if summary.next_row < summary.total_rows {
        println!(
            "  {} rows remain; run again to continue.",
            summary.total_rows - summary.next_row
        );
    }
    Ok(())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:30}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

async fn render_progress(mut rx: EventReceiver) {
    let mut bar: Option<ProgressBar> = None;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event.event {
            BatchEventKind::RunStarted { planned_rows, .. } => {
                let pb = ProgressBar::new(planned_rows as u64);
                pb.set_style(bar_style());
                bar = Some(pb);
            }
            BatchEventKind::RowStarted {
                index,
                address,
                jurisdiction,
            } => {
                if let Some(pb) = &bar {
                    pb.set_message(format!("row {index}: {address}, {jurisdiction}"));
                }
            }
            BatchEventKind::RowFinished {
                index,
                scrape_error,
                ..
            } => {
                if let Some(pb) = &bar {
                    if let Some(error) = scrape_error {
                        pb.println(format!("  row {index}: {error}"));
                    }
                    pb.inc(1);
                }
            }
            BatchEventKind::SessionRebuilt { index, reason } => {
                if let Some(pb) = &bar {
                    pb.println(format!("  row {index}: browser session rebuilt ({reason})"));
                }
            }
            BatchEventKind::RunFinished {
                succeeded, failed, ..
            } => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message(format!("done: {succeeded} ok, {failed} failed"));
                }
            }
        }
    }
    if let Some(pb) = bar {
        pb.abandon();
    }
}
