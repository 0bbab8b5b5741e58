//! Ordered input rows read from delimited text.

use std::io::Read;
use std::path::Path;

use crate::config::{DEFAULT_ADDRESS_COLUMN, DEFAULT_JURISDICTION_COLUMN};
use crate::error::{BatchError, BatchResult};

/// Which input columns hold the address and the jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub address: String,
    pub jurisdiction: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS_COLUMN.to_string(),
            jurisdiction: DEFAULT_JURISDICTION_COLUMN.to_string(),
        }
    }
}

/// The whole input table, held in memory in input order.
#[derive(Debug, Clone)]
pub struct InputTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    address_col: usize,
    jurisdiction_col: usize,
}

/// One input row, borrowed from the table.
#[derive(Debug, Clone, Copy)]
pub struct InputRow<'a> {
    pub index: usize,
    cells: &'a [String],
    address_col: usize,
    jurisdiction_col: usize,
}

impl<'a> InputRow<'a> {
    /// All cells, passed through to the output unchanged.
    pub fn cells(&self) -> &'a [String] {
        self.cells
    }

    pub fn address(&self) -> &'a str {
        self.cells.get(self.address_col).map_or("", String::as_str)
    }

    pub fn jurisdiction(&self) -> &'a str {
        self.cells.get(self.jurisdiction_col).map_or("", String::as_str)
    }
}

impl InputTable {
    pub fn read(path: &Path, columns: &ColumnNames) -> BatchResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            BatchError::Input(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::from_reader(file, columns)
    }

    /// Parse CSV with a header row. Short rows are padded to the header width.
    pub fn from_reader<R: Read>(reader: R, columns: &ColumnNames) -> BatchResult<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let headers: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();
        let address_col = find_column(&headers, &columns.address)?;
        let jurisdiction_col = find_column(&headers, &columns.jurisdiction)?;

        let mut rows = Vec::new();
        for record in csv.records() {
            let mut cells: Vec<String> = record?.iter().map(str::to_string).collect();
            if cells.len() < headers.len() {
                cells.resize(headers.len(), String::new());
            }
            rows.push(cells);
        }
        Ok(Self {
            headers,
            rows,
            address_col,
            jurisdiction_col,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<InputRow<'_>> {
        self.rows.get(index).map(|cells| InputRow {
            index,
            cells,
            address_col: self.address_col,
            jurisdiction_col: self.jurisdiction_col,
        })
    }
}

/// Case-insensitive header lookup.
fn find_column(headers: &[String], name: &str) -> BatchResult<usize> {
    let wanted = name.trim().to_lowercase();
    headers
        .iter()
        .position(|h| h.trim().to_lowercase() == wanted)
        .ok_or_else(|| {
            BatchError::Input(format!(
                "input has no {name:?} column (columns: {})",
                headers.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Owner,street address,COUNTY\n\
                       SMITH,1 Main St,Appling\n\
                       JONES,\"2 Oak Ave, Unit 4\",Columbia\n\
                       SHORT\n";

    #[test]
    fn test_reads_rows_in_order() {
        let table = InputTable::from_reader(CSV.as_bytes(), &ColumnNames::default()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.headers(), ["Owner", "street address", "COUNTY"]);

        let row = table.row(1).unwrap();
        assert_eq!(row.address(), "2 Oak Ave, Unit 4");
        assert_eq!(row.jurisdiction(), "Columbia");
        assert_eq!(row.cells()[0], "JONES");

        let short = table.row(2).unwrap();
        assert_eq!(short.cells().len(), 3);
        assert_eq!(short.address(), "");
    }

    #[test]
    fn test_missing_column_is_input_error() {
        let columns = ColumnNames {
            address: "Situs".into(),
            ..ColumnNames::default()
        };
        let err = InputTable::from_reader(CSV.as_bytes(), &columns).unwrap_err();
        assert!(matches!(err, BatchError::Input(msg) if msg.contains("Situs")));
    }
}
