//! Resume cursor: the index of the next input row to attempt.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{BatchError, BatchResult};

/// Persistent store for the resume cursor.
///
/// Values never decrease: `store` rejects a value lower than the last one.
pub trait Checkpoint: Send {
    /// Read the stored cursor; 0 when nothing was stored yet.
    fn load(&mut self) -> BatchResult<usize>;

    /// Persist `next_row`. Must be durable when this returns.
    fn store(&mut self, next_row: usize) -> BatchResult<()>;
}

fn check_monotonic(last: Option<usize>, next_row: usize) -> BatchResult<()> {
    match last {
        Some(last) if next_row < last => Err(BatchError::Checkpoint(format!(
            "refusing to move checkpoint backwards ({last} -> {next_row})"
        ))),
        _ => Ok(()),
    }
}

/// Checkpoint kept in a single-integer text file.
///
/// Writes go to a temporary sibling that is synced and renamed over the
/// target, so a crash leaves either the old or the new value.
#[derive(Debug)]
pub struct FileCheckpoint {
    path: PathBuf,
    last: Option<usize>,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file without taking ownership of it (for status reports).
    pub fn peek(path: &Path) -> BatchResult<Option<usize>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        raw.trim().parse::<usize>().map(Some).map_err(|_| {
            BatchError::Checkpoint(format!(
                "{} does not hold a row index: {:?}",
                path.display(),
                raw.trim()
            ))
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Checkpoint for FileCheckpoint {
    fn load(&mut self) -> BatchResult<usize> {
        let value = Self::peek(&self.path)?.unwrap_or(0);
        self.last = Some(value);
        Ok(value)
    }

    fn store(&mut self, next_row: usize) -> BatchResult<()> {
        check_monotonic(self.last, next_row)?;
        let tmp = self.temp_path();
        {
            let mut file = File::create(&tmp)?;
            writeln!(file, "{next_row}")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            // Directory fsync makes the rename durable; not supported everywhere.
            if let Ok(handle) = File::open(dir) {
                let _ = handle.sync_all();
            }
        }
        self.last = Some(next_row);
        Ok(())
    }
}

/// In-memory checkpoint. Clones share state, so a caller can keep a handle
/// and inspect the history after handing a clone to the runner.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpoint {
    history: Arc<Mutex<Vec<usize>>>,
}

impl MemoryCheckpoint {
    /// Start from an existing cursor value.
    pub fn starting_at(next_row: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(vec![next_row])),
        }
    }

    /// Every value stored so far, oldest first.
    pub fn history(&self) -> Vec<usize> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn current(&self) -> usize {
        self.history().last().copied().unwrap_or(0)
    }
}

impl Checkpoint for MemoryCheckpoint {
    fn load(&mut self) -> BatchResult<usize> {
        Ok(self.current())
    }

    fn store(&mut self, next_row: usize) -> BatchResult<()> {
        let mut history = self
            .history
            .lock()
            .map_err(|_| BatchError::Checkpoint("checkpoint lock poisoned".into()))?;
        check_monotonic(history.last().copied(), next_row)?;
        history.push(next_row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv.checkpoint");
        let mut cp = FileCheckpoint::new(&path);
        assert_eq!(cp.load().unwrap(), 0);
        cp.store(1).unwrap();
        cp.store(2).unwrap();

        let mut reopened = FileCheckpoint::new(&path);
        assert_eq!(reopened.load().unwrap(), 2);
        assert!(!dir.path().join("out.csv.checkpoint.tmp").exists());
    }

    #[test]
    fn test_rejects_backwards_move() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = FileCheckpoint::new(dir.path().join("cp"));
        cp.load().unwrap();
        cp.store(5).unwrap();
        assert!(matches!(cp.store(4), Err(BatchError::Checkpoint(_))));
        cp.store(5).unwrap();

        let mut mem = MemoryCheckpoint::starting_at(3);
        assert!(mem.store(2).is_err());
        mem.store(4).unwrap();
        assert_eq!(mem.history(), vec![3, 4]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp");
        std::fs::write(&path, "seven\n").unwrap();
        let mut cp = FileCheckpoint::new(&path);
        assert!(matches!(cp.load(), Err(BatchError::Checkpoint(_))));
    }

    #[test]
    fn test_memory_clones_share_state() {
        let handle = MemoryCheckpoint::default();
        let mut runner_side = handle.clone();
        runner_side.store(1).unwrap();
        assert_eq!(handle.current(), 1);
    }
}
