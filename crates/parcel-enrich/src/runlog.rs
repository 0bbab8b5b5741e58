//! JSONL run log: one entry per finished row, append-only.
//!
//! - Rotates when the file exceeds `MAX_LOG_SIZE` (50 MB)
//! - Rotated files are named `.1`, `.2`, ... (at most `MAX_ROTATIONS`)

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::events::RowStatus;

/// Maximum run log size before rotation (50 MB).
const MAX_LOG_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum number of rotated files kept.
const MAX_ROTATIONS: u32 = 3;

/// A single run log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: String,
    pub run_id: String,
    pub row: usize,
    pub address: String,
    pub jurisdiction: String,
    pub status: RowStatus,
    pub scrape_error: Option<String>,
    /// Navigation notes; these never reach the output file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl RunLogEntry {
    /// Entry stamped with the current time.
    pub fn now(run_id: &str, row: usize, address: &str, jurisdiction: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            row,
            address: address.to_string(),
            jurisdiction: jurisdiction.to_string(),
            status: RowStatus::Success,
            scrape_error: None,
            notes: Vec::new(),
            attempts: 1,
            elapsed_ms: 0,
        }
    }
}

/// Append-only JSONL writer with size-based rotation.
pub struct RunLog {
    file: File,
    path: PathBuf,
    current_size: u64,
    max_size: u64,
}

impl RunLog {
    /// Open or create the run log.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: MAX_LOG_SIZE,
        })
    }

    /// Override the rotation threshold.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&mut self, entry: &RunLogEntry) -> io::Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }
        let json = serde_json::to_string(entry).map_err(io::Error::other)?;
        writeln!(self.file, "{json}")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// `run.jsonl` → `run.jsonl.1`, `.1` → `.2`, oldest dropped.
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                std::fs::rename(&from, rotation_path(&self.path, i + 1))?;
            }
        }
        std::fs::rename(&self.path, rotation_path(&self.path, 1))?;

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.current_size = 0;
        tracing::debug!(path = %self.path.display(), "run log rotated");
        Ok(())
    }
}

fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("runlog.jsonl")
    );
    base.with_file_name(name)
}
