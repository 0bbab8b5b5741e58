//! Output rows: the input row followed by the enrichment columns.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{BatchError, BatchResult};
use crate::record::ExtractedRecord;

pub const REPORT_URL_COLUMN: &str = "qpublic_report_url";
pub const VALUE_COLUMN_PREFIX: &str = "property_value_";
const LEADING_COLUMNS: [&str; 5] = [
    REPORT_URL_COLUMN,
    "parcel_number",
    "property_class",
    "property_tax_district",
    "property_acres",
];
const TRAILING_COLUMNS: [&str; 2] = ["property_image", "scrape_error"];

/// Header for the given input header and tracked years.
pub fn output_header(input_headers: &[String], years: &[i32]) -> Vec<String> {
    let mut header = input_headers.to_vec();
    header.extend(LEADING_COLUMNS.iter().map(|c| c.to_string()));
    header.extend(years.iter().map(|y| format!("{VALUE_COLUMN_PREFIX}{y}")));
    header.extend(TRAILING_COLUMNS.iter().map(|c| c.to_string()));
    header
}

/// Input cells followed by the record's fields. Absent values are empty
/// strings; years the record lacks stay empty, never zero.
pub fn compose_row(input: &[String], record: &ExtractedRecord, years: &[i32]) -> Vec<String> {
    let text = |v: Option<&str>| v.unwrap_or_default().to_string();
    let mut row = input.to_vec();
    row.push(text(record.report_url()));
    row.push(text(record.parcel_id()));
    row.push(text(record.property_class()));
    row.push(text(record.tax_district()));
    row.push(text(record.acreage()));
    row.extend(years.iter().map(|y| text(record.valuation(*y))));
    row.push(text(record.image_url()));
    row.push(text(record.scrape_error()));
    row
}

/// Recover the tracked years from an existing output header, checking that
/// it was produced for `input_headers`.
pub fn years_from_header(header: &[String], input_headers: &[String]) -> BatchResult<Vec<i32>> {
    let mismatch = |why: &str| {
        BatchError::Input(format!(
            "existing output header does not match this input ({why})"
        ))
    };
    let n = input_headers.len();
    if header.len() < n + LEADING_COLUMNS.len() + TRAILING_COLUMNS.len()
        || header[..n] != *input_headers
    {
        return Err(mismatch("input columns differ"));
    }
    let rest = &header[n..];
    let (lead, rest) = rest.split_at(LEADING_COLUMNS.len());
    let (values, trail) = rest.split_at(rest.len() - TRAILING_COLUMNS.len());
    if lead.iter().zip(LEADING_COLUMNS).any(|(a, b)| a != b)
        || trail.iter().zip(TRAILING_COLUMNS).any(|(a, b)| a != b)
    {
        return Err(mismatch("enrichment columns differ"));
    }
    values
        .iter()
        .map(|col| {
            col.strip_prefix(VALUE_COLUMN_PREFIX)
                .and_then(|y| y.parse::<i32>().ok())
                .ok_or_else(|| mismatch(&format!("unexpected column {col:?}")))
        })
        .collect()
}

/// Destination for finished rows.
pub trait RowSink: Send {
    /// Valuation years written as columns, ascending.
    fn years(&self) -> &[i32];

    /// Append one row. Must be durable when this returns.
    fn append(&mut self, input: &[String], record: &ExtractedRecord) -> BatchResult<()>;
}

/// Appends rows to a CSV file, writing the header only when the file is new.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    years: Vec<i32>,
}

impl CsvSink {
    /// Open `path` for appending. An existing non-empty file must carry a
    /// compatible header; its years take precedence over `years`.
    pub fn open(path: &Path, input_headers: &[String], years: &[i32]) -> BatchResult<Self> {
        trim_partial_row(path)?;
        let existing = existing_header(path)?;
        let years = match &existing {
            Some(header) => {
                let found = years_from_header(header, input_headers)?;
                if found != years {
                    tracing::info!(?found, "keeping valuation years from existing output");
                }
                found
            }
            None => years.to_vec(),
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if existing.is_none() {
            writer.write_record(output_header(input_headers, &years))?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            years,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Cut a trailing row that was interrupted mid-write back to the last
/// complete line. Its checkpoint never advanced, so the row is redone.
fn trim_partial_row(path: &Path) -> BatchResult<()> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }
    let keep = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "discarding partial trailing row"
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep as u64)?;
    file.sync_all()?;
    Ok(())
}

fn existing_header(path: &Path) -> BatchResult<Option<Vec<String>>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => return Ok(None),
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    Ok(Some(reader.headers()?.iter().map(str::to_string).collect()))
}

impl RowSink for CsvSink {
    fn years(&self) -> &[i32] {
        &self.years
    }

    fn append(&mut self, input: &[String], record: &ExtractedRecord) -> BatchResult<()> {
        self.writer
            .write_record(compose_row(input, record, &self.years))?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Collects rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    years: Vec<i32>,
}

impl MemorySink {
    pub fn new(input_headers: &[String], years: &[i32]) -> Self {
        Self {
            header: output_header(input_headers, years),
            rows: Vec::new(),
            years: years.to_vec(),
        }
    }

    /// Value of `column` in row `index`.
    pub fn cell(&self, index: usize, column: &str) -> Option<&str> {
        let col = self.header.iter().position(|h| h == column)?;
        self.rows.get(index)?.get(col).map(String::as_str)
    }
}

impl RowSink for MemorySink {
    fn years(&self) -> &[i32] {
        &self.years
    }

    fn append(&mut self, input: &[String], record: &ExtractedRecord) -> BatchResult<()> {
        self.rows.push(compose_row(input, record, &self.years));
        Ok(())
    }
}
