// Copyright 2026 Parcel Enrich Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch progress events and their broadcast channel.
//!
//! The batch runner emits a `BatchEvent` at run start, around every row,
//! on session rebuilds, and at run end. Events flow through a
//! `tokio::sync::broadcast` channel to any subscriber (progress bar, tests).
//! With no subscriber they are silently dropped.

use serde::{Deserialize, Serialize};

/// One progress event of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    pub event: BatchEventKind,
}

/// The specific kind of batch event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchEventKind {
    /// The run resumed at `start_row` and will attempt `planned_rows` rows.
    RunStarted {
        total_rows: usize,
        start_row: usize,
        planned_rows: usize,
    },
    RowStarted {
        index: usize,
        address: String,
        jurisdiction: String,
    },
    /// The row's output was written and the checkpoint advanced.
    RowFinished {
        index: usize,
        status: RowStatus,
        scrape_error: Option<String>,
        elapsed_ms: u64,
    },
    /// The session died on row `index` and a fresh one will be used.
    SessionRebuilt { index: usize, reason: String },
    RunFinished {
        next_row: usize,
        attempted: usize,
        succeeded: usize,
        partial: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

/// How a finished row turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Every region extracted without notes.
    Success,
    /// Some data extracted, with notes.
    Partial,
    /// No data; `scrape_error` holds the reason.
    Failed,
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Sender handle for batch events.
pub type EventSender = tokio::sync::broadcast::Sender<BatchEvent>;

/// Receiver handle for batch events.
pub type EventReceiver = tokio::sync::broadcast::Receiver<BatchEvent>;

/// Create a batch event channel.
///
/// A run emits a handful of events per row; 1024 slots keeps a slow
/// renderer from lagging on typical batches.
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(1024)
}

/// Emit an event, ignoring send errors (no receivers listening).
pub fn emit(tx: &Option<EventSender>, run_id: &str, seq: &mut u64, event: BatchEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(BatchEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = BatchEvent {
            run_id: "run-1".to_string(),
            seq: 3,
            event: BatchEventKind::RowFinished {
                index: 7,
                status: RowStatus::Partial,
                scrape_error: Some("valuation: region not found".into()),
                elapsed_ms: 1200,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"RowFinished\""));
        assert!(json.contains("\"status\":\"partial\""));

        let parsed: BatchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seq, 3);
        assert_eq!(parsed.event, event.event);
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        let mut seq = 0;
        emit(
            &Some(tx),
            "run",
            &mut seq,
            BatchEventKind::SessionRebuilt {
                index: 0,
                reason: "ws closed".into(),
            },
        );
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_emit_none_sender_is_noop() {
        let mut seq = 0;
        emit(
            &None,
            "run",
            &mut seq,
            BatchEventKind::RunStarted {
                total_rows: 1,
                start_row: 0,
                planned_rows: 1,
            },
        );
        assert_eq!(seq, 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let (tx, mut rx) = channel();
        let sender = Some(tx);
        let mut seq = 0;
        for index in 0..3 {
            emit(
                &sender,
                "run",
                &mut seq,
                BatchEventKind::RowStarted {
                    index,
                    address: "1 Main St".into(),
                    jurisdiction: "Appling".into(),
                },
            );
        }
        for expected in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().seq, expected);
        }
    }
}
