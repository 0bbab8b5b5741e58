// Copyright 2026 Parcel Enrich Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use parcel_enrich::batch::ColumnNames;
use parcel_enrich::config::{DEFAULT_ADDRESS_COLUMN, DEFAULT_JURISDICTION_COLUMN};

mod commands;

use commands::run::RunArgs;

#[derive(Parser)]
#[command(
    name = "parcel-enrich",
    about = "Enrich an address table with parcel records from a property-search site",
    version,
    after_help = "Run 'parcel-enrich <command> --help' for details on each command."
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the input table, resuming from the checkpoint
    Run(RunArgs),

    /// Show how far a run has progressed
    Status {
        /// Input CSV
        input: PathBuf,
        /// Output CSV the run appends to
        output: PathBuf,
        /// Checkpoint file (default: <output>.checkpoint)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Input column holding the street address
        #[arg(long, default_value = DEFAULT_ADDRESS_COLUMN)]
        address_column: String,
        /// Input column holding the county / jurisdiction
        #[arg(long, default_value = DEFAULT_JURISDICTION_COLUMN)]
        jurisdiction_column: String,
    },

    /// Check the browser, the site profile, and an existing checkpoint
    Doctor {
        /// Site profile JSON (env: PARCEL_ENRICH_PROFILE)
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Output CSV whose checkpoint should be inspected
        #[arg(long)]
        output: Option<PathBuf>,
        /// Checkpoint file to inspect (default: <output>.checkpoint)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Extract a record from a saved detail page and print it as JSON
    Extract {
        /// Saved HTML of a parcel report page
        html: PathBuf,
        /// URL the page was saved from; resolves relative image links
        #[arg(long)]
        url: Option<String>,
        /// Site profile JSON (env: PARCEL_ENRICH_PROFILE)
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Print the default site profile as JSON
    Profile,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   parcel-enrich completions bash > ~/.local/share/bash-completion/completions/parcel-enrich
    ///   parcel-enrich completions zsh > ~/.zfunc/_parcel-enrich
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Status {
            input,
            output,
            checkpoint,
            address_column,
            jurisdiction_column,
        } => {
            let columns = ColumnNames {
                address: address_column,
                jurisdiction: jurisdiction_column,
            };
            commands::status::run(&input, &output, checkpoint.as_deref(), &columns)
        }
        Commands::Doctor {
            profile,
            output,
            checkpoint,
        } => commands::doctor::run(profile.as_deref(), output.as_deref(), checkpoint.as_deref()),
        Commands::Extract { html, url, profile } => {
            commands::extract::run(&html, url.as_deref(), profile.as_deref())
        }
        Commands::Profile => commands::profile::run(),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "parcel-enrich", &mut std::io::stdout());
            Ok(())
        }
    };

    // 0 = success, 1 = error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
