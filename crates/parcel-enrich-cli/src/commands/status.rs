//! `parcel-enrich status`: progress of a run, read from its checkpoint.

use std::path::Path;

use anyhow::{Context, Result};

use parcel_enrich::batch::{ColumnNames, FileCheckpoint, InputTable};
use parcel_enrich::config;

/// Print total rows, the checkpoint value, and how many rows remain.
pub fn run(
    input: &Path,
    output: &Path,
    checkpoint: Option<&Path>,
    columns: &ColumnNames,
) -> Result<()> {
    let table = InputTable::read(input, columns)
        .with_context(|| format!("reading {}", input.display()))?;

    let path = config::checkpoint_path(output, checkpoint);
    let next = FileCheckpoint::peek(&path)?;

    println!("Input:      {}", input.display());
    println!("Output:     {}", output.display());
    println!("Checkpoint: {}", path.display());
    println!();
    println!("Total rows: {}", table.len());
    match next {
        Some(n) => println!("Next row:   {n}"),
        None => println!("Next row:   0 (no checkpoint yet)"),
    }
    let done = next.unwrap_or(0).min(table.len());
    println!("Remaining:  {}", table.len() - done);
    if !table.is_empty() && done == table.len() {
        println!();
        println!("Status: COMPLETE");
    }
    Ok(())
}
