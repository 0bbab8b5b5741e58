//! Per-row state carried through navigation, and the enriched record.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::FailureReason;

/// State for one input row while it is navigated.
///
/// Created fresh for every attempt; nothing here survives a session rebuild.
#[derive(Debug, Clone, Default)]
pub struct RowContext {
    pub address: String,
    pub jurisdiction: String,
    app_id: Option<String>,
    /// URL observed after the most recent transition.
    pub last_url: Option<String>,
    notes: Vec<String>,
}

impl RowContext {
    pub fn new(address: impl Into<String>, jurisdiction: impl Into<String>) -> Self {
        Self {
            address: address.into().trim().to_string(),
            jurisdiction: jurisdiction.into().trim().to_string(),
            ..Self::default()
        }
    }

    /// Application identifier captured for this row, if any.
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Record the application identifier. The first capture wins.
    pub fn set_app_id(&mut self, id: impl Into<String>) {
        if self.app_id.is_none() {
            self.app_id = Some(id.into());
        }
    }

    /// Attach a non-fatal navigation note.
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn is_blank(&self) -> bool {
        self.address.is_empty() || self.jurisdiction.is_empty()
    }
}

/// Result of enriching one row. Every field is optional; failures are
/// described by `scrape_error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedRecord {
    parcel_id: Option<String>,
    property_class: Option<String>,
    tax_district: Option<String>,
    acreage: Option<String>,
    valuations: BTreeMap<i32, String>,
    image_url: Option<String>,
    report_url: Option<String>,
    scrape_error: Option<String>,
}

impl ExtractedRecord {
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// An empty record for a row abandoned during navigation.
    pub fn failed(reason: FailureReason) -> Self {
        Self {
            scrape_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// An empty record carrying a free-form error.
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            scrape_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn parcel_id(&self) -> Option<&str> {
        self.parcel_id.as_deref()
    }

    pub fn property_class(&self) -> Option<&str> {
        self.property_class.as_deref()
    }

    pub fn tax_district(&self) -> Option<&str> {
        self.tax_district.as_deref()
    }

    pub fn acreage(&self) -> Option<&str> {
        self.acreage.as_deref()
    }

    /// Valuation by year; only years actually found on the page.
    pub fn valuations(&self) -> &BTreeMap<i32, String> {
        &self.valuations
    }

    pub fn valuation(&self, year: i32) -> Option<&str> {
        self.valuations.get(&year).map(String::as_str)
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn report_url(&self) -> Option<&str> {
        self.report_url.as_deref()
    }

    pub fn scrape_error(&self) -> Option<&str> {
        self.scrape_error.as_deref()
    }

    /// Whether any property field was populated.
    pub fn has_data(&self) -> bool {
        self.parcel_id.is_some()
            || self.property_class.is_some()
            || self.tax_district.is_some()
            || self.acreage.is_some()
            || !self.valuations.is_empty()
            || self.image_url.is_some()
    }
}

/// Builder for [`ExtractedRecord`]; blank values are stored as absent.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    record: ExtractedRecord,
    notes: Vec<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RecordBuilder {
    pub fn parcel_id(mut self, value: Option<String>) -> Self {
        self.record.parcel_id = non_blank(value);
        self
    }

    pub fn property_class(mut self, value: Option<String>) -> Self {
        self.record.property_class = non_blank(value);
        self
    }

    pub fn tax_district(mut self, value: Option<String>) -> Self {
        self.record.tax_district = non_blank(value);
        self
    }

    pub fn acreage(mut self, value: Option<String>) -> Self {
        self.record.acreage = non_blank(value);
        self
    }

    pub fn valuations(mut self, values: BTreeMap<i32, String>) -> Self {
        self.record.valuations = values;
        self
    }

    pub fn image_url(mut self, value: Option<String>) -> Self {
        self.record.image_url = non_blank(value);
        self
    }

    pub fn report_url(mut self, value: Option<String>) -> Self {
        self.record.report_url = non_blank(value);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Notes are joined with `"; "` into `scrape_error`.
    pub fn build(mut self) -> ExtractedRecord {
        if !self.notes.is_empty() {
            self.record.scrape_error = Some(self.notes.join("; "));
        }
        self.record
    }
}
