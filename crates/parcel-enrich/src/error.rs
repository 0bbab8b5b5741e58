//! Error taxonomy for the enrichment pipeline.
//!
//! Row-scoped errors ([`FailureReason`], [`ExtractionError`], [`SessionFault`])
//! never leave the batch runner; they end up in the `scrape_error` column.
//! Only [`BatchError`] propagates to the operator.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DriverError;

/// Stage at which navigation abandoned a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The site's home page could not be loaded for this row.
    HomeUnreachable,
    /// No jurisdiction option or link matched the row's jurisdiction.
    JurisdictionNotFound,
    /// Quick-link, identifier link and constructed URL all failed.
    AppEntryUnresolved,
    /// The address search control never became available.
    SearchPanelUnavailable,
    /// The search produced neither a detail page nor a result list.
    NoResults,
    /// A result list was shown but no candidate led to a detail page.
    AmbiguousResultUnresolvable,
    /// The input row lacks an address or jurisdiction.
    MissingInput,
    /// The browser session died on the row, and again on its retry.
    SessionFault,
}

impl FailureReason {
    /// Stable kebab-case identifier written to the output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HomeUnreachable => "home-unreachable",
            Self::JurisdictionNotFound => "jurisdiction-not-found",
            Self::AppEntryUnresolved => "app-entry-unresolved",
            Self::SearchPanelUnavailable => "search-panel-unavailable",
            Self::NoResults => "no-results",
            Self::AmbiguousResultUnresolvable => "ambiguous-result-unresolvable",
            Self::MissingInput => "missing-input",
            Self::SessionFault => "session-fault",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic region of a detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Page,
    Summary,
    Valuation,
    Image,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page => write!(f, "page"),
            Self::Summary => write!(f, "summary"),
            Self::Valuation => write!(f, "valuation"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// A non-fatal problem extracting one region; recorded as a note.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("{region}: region not found")]
    RegionMissing { region: Region },

    #[error("{region}: {detail}")]
    Malformed { region: Region, detail: String },
}

/// The browser session died while processing a row.
#[derive(Debug, Error)]
#[error("session fault: {0}")]
pub struct SessionFault(#[source] pub DriverError);

impl From<DriverError> for SessionFault {
    fn from(err: DriverError) -> Self {
        Self(err)
    }
}

/// Errors that abort a whole batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The target site or the browser cannot be reached at all.
    #[error("fatal setup error: {0}")]
    FatalSetup(String),

    /// The input or an existing output file is unusable.
    #[error("input error: {0}")]
    Input(String),

    /// The checkpoint file is unreadable or would move backwards.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience result type for batch-level operations.
pub type BatchResult<T> = Result<T, BatchError>;
