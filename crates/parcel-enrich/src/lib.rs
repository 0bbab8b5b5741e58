// Copyright 2026 Parcel Enrich Contributors
// SPDX-License-Identifier: Apache-2.0

//! Parcel enrichment: drives a property-records web application through its
//! multi-screen flow, extracts parcel data from detail pages, and runs the
//! whole thing over an input table with a resumable checkpoint.
//!
//! Layers, bottom-up: [`driver`] (browser session), [`navigator`] (state
//! machine), [`extractor`] (detail page → [`record::ExtractedRecord`]),
//! [`batch`] (ordered, checkpointed, session-fault tolerant runner).

pub mod batch;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod extractor;
pub mod navigator;
pub mod profile;
pub mod record;
pub mod runlog;

pub use batch::{BatchRunner, RunOptions, RunSummary};
pub use driver::{DriverError, DriverFactory, PageDriver};
pub use error::{BatchError, FailureReason};
pub use extractor::Extractor;
pub use navigator::{NavigationState, Navigator};
pub use profile::SiteProfile;
pub use record::{ExtractedRecord, RowContext};
