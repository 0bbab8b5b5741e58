//! Checkpointed batch runner.
//!
//! Processes input rows strictly in order, one browser session at a time.
//! For every attempted row, the output row is written durably before the
//! checkpoint advances. A session that dies mid-row is rebuilt and the same
//! row retried once; a second death records the row as failed.

pub mod checkpoint;
pub mod pacing;
pub mod sink;
pub mod table;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::driver::{DriverFactory, PageDriver};
use crate::error::{BatchError, BatchResult, FailureReason, SessionFault};
use crate::events::{self, BatchEventKind, EventSender, RowStatus};
use crate::extractor::Extractor;
use crate::navigator::{NavigationState, Navigator};
use crate::profile::SiteProfile;
use crate::record::{ExtractedRecord, RowContext};
use crate::runlog::{RunLog, RunLogEntry};

pub use checkpoint::{Checkpoint, FileCheckpoint, MemoryCheckpoint};
pub use pacing::Pacing;
pub use sink::{CsvSink, MemorySink, RowSink};
pub use table::{ColumnNames, InputRow, InputTable};

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop after attempting this many rows.
    pub limit: Option<usize>,
    pub pacing: Pacing,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            pacing: Pacing::default(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub total_rows: usize,
    pub start_row: usize,
    /// Checkpoint value after the run.
    pub next_row: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub session_rebuilds: usize,
    pub elapsed: Duration,
}

/// Final result of one row.
struct RowOutcome {
    record: ExtractedRecord,
    notes: Vec<String>,
    attempts: u32,
}

fn status_of(record: &ExtractedRecord) -> RowStatus {
    match (record.scrape_error(), record.has_data()) {
        (None, _) => RowStatus::Success,
        (Some(_), true) => RowStatus::Partial,
        (Some(_), false) => RowStatus::Failed,
    }
}

/// Owns the browser session, the checkpoint, the navigator and the extractor
/// for the duration of a run.
pub struct BatchRunner {
    factory: Arc<dyn DriverFactory>,
    checkpoint: Box<dyn Checkpoint>,
    navigator: Navigator,
    extractor: Extractor,
    options: RunOptions,
    events: Option<EventSender>,
    runlog: Option<RunLog>,
    driver: Option<Box<dyn PageDriver>>,
    run_id: String,
    seq: u64,
}

impl BatchRunner {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        checkpoint: Box<dyn Checkpoint>,
        profile: Arc<SiteProfile>,
        options: RunOptions,
    ) -> BatchResult<Self> {
        let navigator = Navigator::new(Arc::clone(&profile))
            .map_err(|e| BatchError::FatalSetup(e.to_string()))?;
        Ok(Self {
            factory,
            checkpoint,
            navigator,
            extractor: Extractor::new(profile),
            options,
            events: None,
            runlog: None,
            driver: None,
            run_id: uuid::Uuid::new_v4().to_string(),
            seq: 0,
        })
    }

    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_runlog(mut self, log: RunLog) -> Self {
        self.runlog = Some(log);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn emit(&mut self, event: BatchEventKind) {
        events::emit(&self.events, &self.run_id, &mut self.seq, event);
    }

    /// Process rows from the checkpoint onwards, up to the row limit.
    ///
    /// Only setup failures, an unusable checkpoint, or output I/O errors end
    /// the run early; every row-level problem is written to the output.
    pub async fn run(
        &mut self,
        input: &InputTable,
        sink: &mut dyn RowSink,
    ) -> BatchResult<RunSummary> {
        let started = Instant::now();
        let start_row = self.checkpoint.load()?;
        let end = match self.options.limit {
            Some(limit) => start_row.saturating_add(limit).min(input.len()),
            None => input.len(),
        };
        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            total_rows: input.len(),
            start_row,
            next_row: start_row,
            ..RunSummary::default()
        };

        tracing::info!(
            run_id = %self.run_id,
            total = input.len(),
            start_row,
            end,
            "batch run starting"
        );
        self.emit(BatchEventKind::RunStarted {
            total_rows: input.len(),
            start_row,
            planned_rows: end.saturating_sub(start_row),
        });

        if start_row < end {
            self.probe().await?;
        }

        for index in start_row..end {
            let Some(row) = input.row(index) else {
                break;
            };
            if index > start_row {
                self.options.pacing.pause().await;
            }
            let row_started = Instant::now();
            self.emit(BatchEventKind::RowStarted {
                index,
                address: row.address().to_string(),
                jurisdiction: row.jurisdiction().to_string(),
            });

            let outcome = self.process_row(&row, &mut summary).await?;
            sink.append(row.cells(), &outcome.record)?;
            self.checkpoint.store(index + 1)?;
            summary.next_row = index + 1;
            summary.attempted += 1;

            let status = status_of(&outcome.record);
            match status {
                RowStatus::Success => summary.succeeded += 1,
                RowStatus::Partial => summary.partial += 1,
                RowStatus::Failed => summary.failed += 1,
            }
            let elapsed_ms = row_started.elapsed().as_millis() as u64;
            tracing::info!(
                row = index,
                %status,
                error = outcome.record.scrape_error().unwrap_or(""),
                elapsed_ms,
                "row finished"
            );
            self.log_row(&row, &outcome, status, elapsed_ms);
            self.emit(BatchEventKind::RowFinished {
                index,
                status,
                scrape_error: outcome.record.scrape_error().map(str::to_string),
                elapsed_ms,
            });
        }

        self.close_session().await;
        summary.elapsed = started.elapsed();
        self.emit(BatchEventKind::RunFinished {
            next_row: summary.next_row,
            attempted: summary.attempted,
            succeeded: summary.succeeded,
            partial: summary.partial,
            failed: summary.failed,
            elapsed_ms: summary.elapsed.as_millis() as u64,
        });
        tracing::info!(
            next_row = summary.next_row,
            attempted = summary.attempted,
            failed = summary.failed,
            "batch run finished"
        );
        Ok(summary)
    }

    /// Open a session and load the home page; failure aborts the run.
    async fn probe(&mut self) -> BatchResult<()> {
        let mut driver = self.launch().await?;
        let home = self.navigator.profile().home_url.clone();
        if let Err(e) = driver.navigate(&home).await {
            tracing::error!(%home, error = %e, "target site unreachable");
            if let Err(e) = driver.close().await {
                tracing::debug!(error = %e, "closing session");
            }
            return Err(BatchError::FatalSetup(format!("cannot reach {home}: {e}")));
        }
        self.driver = Some(driver);
        Ok(())
    }

    async fn launch(&self) -> BatchResult<Box<dyn PageDriver>> {
        self.factory.launch().await.map_err(|e| {
            tracing::error!(error = %e, "cannot open a browser session");
            BatchError::FatalSetup(e.to_string())
        })
    }

    /// Run one row, retrying once on a fresh session after a session fault.
    async fn process_row(
        &mut self,
        row: &InputRow<'_>,
        summary: &mut RunSummary,
    ) -> BatchResult<RowOutcome> {
        let mut ctx = RowContext::new(row.address(), row.jurisdiction());
        if ctx.is_blank() {
            return Ok(RowOutcome {
                record: ExtractedRecord::failed(FailureReason::MissingInput),
                notes: Vec::new(),
                attempts: 0,
            });
        }

        match self.attempt(&mut ctx).await? {
            Ok(record) => {
                return Ok(RowOutcome {
                    record,
                    notes: ctx.notes().to_vec(),
                    attempts: 1,
                })
            }
            Err(fault) => {
                tracing::warn!(row = row.index, error = %fault, "session fault, rebuilding session");
                summary.session_rebuilds += 1;
                self.emit(BatchEventKind::SessionRebuilt {
                    index: row.index,
                    reason: fault.0.to_string(),
                });
            }
        }

        let mut retry = RowContext::new(row.address(), row.jurisdiction());
        match self.attempt(&mut retry).await? {
            Ok(record) => Ok(RowOutcome {
                record,
                notes: retry.notes().to_vec(),
                attempts: 2,
            }),
            Err(fault) => {
                tracing::warn!(row = row.index, error = %fault, "session fault on retry, giving up on row");
                let mut notes = retry.notes().to_vec();
                notes.push(fault.to_string());
                Ok(RowOutcome {
                    record: ExtractedRecord::failed(FailureReason::SessionFault),
                    notes,
                    attempts: 2,
                })
            }
        }
    }

    /// One attempt on the current session (launched if needed). A session
    /// fault closes the session and is returned as the inner error.
    async fn attempt(
        &mut self,
        ctx: &mut RowContext,
    ) -> BatchResult<Result<ExtractedRecord, SessionFault>> {
        let mut driver = match self.driver.take() {
            Some(driver) => driver,
            None => self.launch().await?,
        };

        let result = match self.navigator.drive(driver.as_mut(), ctx).await {
            Ok(NavigationState::Detail) => self.extractor.extract(driver.as_mut()).await,
            Ok(NavigationState::Failed(reason)) => Ok(ExtractedRecord::failed(reason)),
            Ok(other) => Ok(ExtractedRecord::errored(format!(
                "navigation stopped at {other}"
            ))),
            Err(fault) => Err(fault),
        };

        if result.is_err() {
            if let Err(e) = driver.close().await {
                tracing::debug!(error = %e, "closing dead session");
            }
        } else {
            self.driver = Some(driver);
        }
        Ok(result)
    }

    async fn close_session(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.close().await {
                tracing::debug!(error = %e, "closing session");
            }
        }
    }

    fn log_row(&mut self, row: &InputRow<'_>, outcome: &RowOutcome, status: RowStatus, elapsed_ms: u64) {
        let Some(log) = self.runlog.as_mut() else {
            return;
        };
        let mut entry = RunLogEntry::now(&self.run_id, row.index, row.address(), row.jurisdiction());
        entry.status = status;
        entry.scrape_error = outcome.record.scrape_error().map(str::to_string);
        entry.notes = outcome.notes.clone();
        entry.attempts = outcome.attempts;
        entry.elapsed_ms = elapsed_ms;
        if let Err(e) = log.log(&entry) {
            tracing::warn!(path = %log.path().display(), error = %e, "run log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of() {
        assert_eq!(status_of(&ExtractedRecord::default()), RowStatus::Success);
        assert_eq!(
            status_of(&ExtractedRecord::failed(FailureReason::NoResults)),
            RowStatus::Failed
        );
        let partial = ExtractedRecord::builder()
            .acreage(Some("1.0".into()))
            .note("valuation: region not found")
            .build();
        assert_eq!(status_of(&partial), RowStatus::Partial);
    }
}
