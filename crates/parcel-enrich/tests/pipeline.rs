//! End-to-end batch runs against the fixture site: output completeness,
//! resume equivalence, row limits, and fatal setup handling.

mod common;

use std::sync::Arc;

use parcel_enrich::batch::{
    BatchRunner, Checkpoint, CsvSink, FileCheckpoint, MemoryCheckpoint, MemorySink, RowSink,
};
use parcel_enrich::events::{self, BatchEventKind, RowStatus};
use parcel_enrich::runlog::{RunLog, RunLogEntry};
use parcel_enrich::{BatchError, ExtractedRecord};

use common::*;

fn runner(checkpoint: Box<dyn Checkpoint>, limit: Option<usize>) -> BatchRunner {
    BatchRunner::new(Arc::new(factory()), checkpoint, profile(), options(limit)).unwrap()
}

// ── Output completeness ──

#[tokio::test]
async fn test_every_row_is_written() {
    let table = input(INPUT);
    let checkpoint = MemoryCheckpoint::default();
    let mut sink = MemorySink::new(table.headers(), &YEARS);

    let summary = runner(Box::new(checkpoint.clone()), None)
        .run(&table, &mut sink)
        .await
        .unwrap();

    assert_eq!(sink.rows.len(), table.len());
    assert_eq!(summary.attempted, 6);
    assert_eq!(summary.next_row, 6);
    assert_eq!(checkpoint.history(), vec![1, 2, 3, 4, 5, 6]);

    let errors: Vec<&str> = (0..6)
        .map(|i| sink.cell(i, "scrape_error").unwrap())
        .collect();
    assert_eq!(
        errors,
        [
            "",
            "",
            "no-results",
            "valuation: region not found",
            "missing-input",
            "jurisdiction-not-found",
        ]
    );
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.partial, 1);
    assert_eq!(summary.failed, 3);

    // Input columns pass through unchanged.
    assert_eq!(sink.cell(4, "Owner"), Some("GREEN"));
}

#[tokio::test]
async fn test_no_results_row_is_empty_but_present() {
    let table = input("Street Address,County\n100 Main St,Appling\n");
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    runner(Box::new(MemoryCheckpoint::default()), None)
        .run(&table, &mut sink)
        .await
        .unwrap();

    assert_eq!(sink.rows.len(), 1);
    assert_eq!(sink.cell(0, "scrape_error"), Some("no-results"));
    for column in ["parcel_number", "property_class", "property_value_2024"] {
        assert_eq!(sink.cell(0, column), Some(""), "{column}");
    }
}

#[tokio::test]
async fn test_per_year_valuations_stay_sparse() {
    let table = input("Street Address,County\n1 Main St,Appling\n");
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    runner(Box::new(MemoryCheckpoint::default()), None)
        .run(&table, &mut sink)
        .await
        .unwrap();

    assert_eq!(sink.cell(0, "parcel_number"), Some("001 042"));
    assert_eq!(sink.cell(0, "property_value_2020"), Some(""));
    assert_eq!(sink.cell(0, "property_value_2021"), Some("117,500"));
    assert_eq!(sink.cell(0, "property_value_2024"), Some("150,400"));
    assert_eq!(
        sink.cell(0, "property_image"),
        Some("https://county.test/photos/001.jpg")
    );
    assert_eq!(
        sink.cell(0, "qpublic_report_url"),
        Some("https://county.test/parcel/001")
    );
}

#[tokio::test]
async fn test_disambiguation_and_current_value_layout() {
    let table = input("Street Address,County\n2 Oak Ave,Columbia\n");
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    runner(Box::new(MemoryCheckpoint::default()), None)
        .run(&table, &mut sink)
        .await
        .unwrap();

    assert_eq!(sink.cell(0, "parcel_number"), Some("002 117"));
    assert_eq!(sink.cell(0, "property_value_2022"), Some(""));
    assert_eq!(sink.cell(0, "property_value_2023"), Some("61,000"));
    assert_eq!(sink.cell(0, "property_value_2024"), Some("64,250"));
    assert_eq!(sink.cell(0, "scrape_error"), Some(""));
}

// ── Resume and limits ──

async fn run_to_file(dir: &std::path::Path, limits: &[Option<usize>]) -> String {
    let table = input(INPUT);
    let output = dir.join("out.csv");
    for limit in limits {
        let checkpoint = FileCheckpoint::new(dir.join("out.csv.checkpoint"));
        let mut sink = CsvSink::open(&output, table.headers(), &YEARS).unwrap();
        runner(Box::new(checkpoint), *limit)
            .run(&table, &mut sink)
            .await
            .unwrap();
    }
    std::fs::read_to_string(output).unwrap()
}

#[tokio::test]
async fn test_resume_matches_uninterrupted_run() {
    let whole = tempfile::tempdir().unwrap();
    let pieces = tempfile::tempdir().unwrap();

    let uninterrupted = run_to_file(whole.path(), &[None]).await;
    let resumed = run_to_file(pieces.path(), &[Some(2), Some(1), None]).await;

    assert_eq!(uninterrupted, resumed);
    assert_eq!(resumed.lines().count(), 7);
    assert_eq!(resumed.matches("scrape_error").count(), 1);
    let stored = std::fs::read_to_string(pieces.path().join("out.csv.checkpoint")).unwrap();
    assert_eq!(stored.trim(), "6");
}

#[tokio::test]
async fn test_limit_halts_intake() {
    let table = input(INPUT);
    let checkpoint = MemoryCheckpoint::starting_at(1);
    let mut sink = MemorySink::new(table.headers(), &YEARS);

    let summary = runner(Box::new(checkpoint.clone()), Some(2))
        .run(&table, &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.start_row, 1);
    assert_eq!(summary.attempted, 2);
    assert_eq!(checkpoint.current(), 3);
    assert_eq!(sink.rows.len(), 2);
    assert_eq!(sink.cell(0, "Owner"), Some("JONES"));
}

#[tokio::test]
async fn test_finished_checkpoint_is_a_no_op() {
    let table = input(INPUT);
    let factory = Arc::new(factory());
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    let summary = BatchRunner::new(
        factory.clone(),
        Box::new(MemoryCheckpoint::starting_at(6)),
        profile(),
        options(None),
    )
    .unwrap()
    .run(&table, &mut sink)
    .await
    .unwrap();

    assert_eq!(summary.attempted, 0);
    assert!(sink.rows.is_empty());
    assert_eq!(factory.launches(), 0);
}

// ── Fatal setup ──

#[tokio::test]
async fn test_unlaunchable_browser_is_fatal() {
    let table = input(INPUT);
    let checkpoint = MemoryCheckpoint::default();
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    let err = BatchRunner::new(
        Arc::new(factory().with_max_launches(0)),
        Box::new(checkpoint.clone()),
        profile(),
        options(None),
    )
    .unwrap()
    .run(&table, &mut sink)
    .await
    .unwrap_err();

    assert!(matches!(err, BatchError::FatalSetup(_)));
    assert!(sink.rows.is_empty());
    assert!(checkpoint.history().is_empty());
}

#[tokio::test]
async fn test_unreachable_site_is_fatal() {
    let table = input(INPUT);
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    let factory = factory().with_tripwire("county.test/", 1);
    let err = BatchRunner::new(
        Arc::new(factory.clone()),
        Box::new(MemoryCheckpoint::default()),
        profile(),
        options(None),
    )
    .unwrap()
    .run(&table, &mut sink)
    .await
    .unwrap_err();

    assert!(matches!(err, BatchError::FatalSetup(msg) if msg.contains("county.test")));
    assert!(sink.rows.is_empty());
    // The killed session is still closed, and its close error is not fatal.
    assert_eq!(factory.launches(), 1);
    assert_eq!(factory.closes(), 1);
}

#[tokio::test]
async fn test_corrupt_checkpoint_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv.checkpoint");
    std::fs::write(&path, "not a number").unwrap();

    let table = input(INPUT);
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    let err = runner(Box::new(FileCheckpoint::new(&path)), None)
        .run(&table, &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::Checkpoint(_)));
    assert!(sink.rows.is_empty());
}

// ── Durability ──

/// Accepts rows until `fail_at`, then reports a write failure.
struct FailingSink {
    inner: MemorySink,
    fail_at: usize,
}

impl RowSink for FailingSink {
    fn years(&self) -> &[i32] {
        self.inner.years()
    }

    fn append(&mut self, input: &[String], record: &ExtractedRecord) -> Result<(), BatchError> {
        if self.inner.rows.len() == self.fail_at {
            return Err(BatchError::Io(std::io::Error::other("disk full")));
        }
        self.inner.append(input, record)
    }
}

#[tokio::test]
async fn test_failed_write_leaves_checkpoint_behind() {
    let table = input(INPUT);
    let checkpoint = MemoryCheckpoint::default();
    let mut sink = FailingSink {
        inner: MemorySink::new(table.headers(), &YEARS),
        fail_at: 2,
    };

    let result = runner(Box::new(checkpoint.clone()), None)
        .run(&table, &mut sink)
        .await;

    assert!(matches!(result, Err(BatchError::Io(_))));
    assert_eq!(sink.inner.rows.len(), 2);
    assert_eq!(checkpoint.history(), vec![1, 2]);
    assert_eq!(checkpoint.current(), 2);
}

// ── Telemetry ──

#[tokio::test]
async fn test_events_and_runlog() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("out.csv.runlog.jsonl");
    let table = input(INPUT);
    let mut sink = MemorySink::new(table.headers(), &YEARS);
    let (tx, mut rx) = events::channel();

    let mut batch = runner(Box::new(MemoryCheckpoint::default()), Some(3))
        .with_events(tx)
        .with_runlog(RunLog::open(&log_path).unwrap());
    let run_id = batch.run_id().to_string();
    batch.run(&table, &mut sink).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id, run_id);
        kinds.push(event.event);
    }
    assert!(matches!(
        kinds.first(),
        Some(BatchEventKind::RunStarted {
            planned_rows: 3,
            ..
        })
    ));
    assert!(matches!(
        kinds.last(),
        Some(BatchEventKind::RunFinished { attempted: 3, .. })
    ));
    let finished: Vec<RowStatus> = kinds
        .iter()
        .filter_map(|k| match k {
            BatchEventKind::RowFinished { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        finished,
        [RowStatus::Success, RowStatus::Success, RowStatus::Failed]
    );

    let entries: Vec<RunLogEntry> = std::fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].scrape_error.as_deref(), Some("no-results"));
    assert!(entries.iter().all(|e| e.run_id == run_id));
}

#[test]
fn test_memory_sink_years() {
    let table = input(INPUT);
    let sink = MemorySink::new(table.headers(), &YEARS);
    assert_eq!(sink.years(), YEARS);
}
