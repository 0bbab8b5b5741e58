//! Valuation tables in the two layouts seen on detail pages.
//!
//! Layout (a): one row per year, the year in the first cell and the total
//! value in the last cell.
//!
//! Layout (b): a header row listing years and a "current value" row whose
//! values line up with the header from the right.

use std::collections::BTreeMap;

use scraper::{ElementRef, Selector};

use super::text::{normalize_currency, normalize_label, parse_year, row_cells};

pub type Valuations = BTreeMap<i32, String>;

/// Which layout produced the valuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    PerYear,
    CurrentValue,
}

/// Try layout (a) across all tables, then layout (b). Returns `None` when
/// neither yields a single value.
pub fn extract_valuations(
    tables: &[ElementRef<'_>],
    current_labels: &[String],
) -> Option<(Layout, Valuations)> {
    let rows = match Selector::parse("tr") {
        Ok(sel) => sel,
        Err(_) => return None,
    };
    let tables: Vec<Vec<Vec<String>>> = tables
        .iter()
        .map(|t| t.select(&rows).map(|r| row_cells(&r)).collect())
        .collect();

    let per_year = per_year_layout(&tables);
    if !per_year.is_empty() {
        return Some((Layout::PerYear, per_year));
    }
    let current = current_value_layout(&tables, current_labels);
    if !current.is_empty() {
        return Some((Layout::CurrentValue, current));
    }
    None
}

/// Layout (a). The first occurrence of a year wins.
fn per_year_layout(tables: &[Vec<Vec<String>>]) -> Valuations {
    let mut out = Valuations::new();
    for row in tables.iter().flatten() {
        if row.len() < 2 || is_year_header(row) {
            continue;
        }
        let Some(year) = parse_year(&row[0]) else {
            continue;
        };
        if let Some(value) = row.last().and_then(|cell| normalize_currency(cell)) {
            out.entry(year).or_insert(value);
        }
    }
    out
}

/// Layout (b). Uses the first table that has both a year header and a
/// current-value row.
fn current_value_layout(tables: &[Vec<Vec<String>>], current_labels: &[String]) -> Valuations {
    let labels: Vec<String> = current_labels.iter().map(|l| normalize_label(l)).collect();

    for rows in tables {
        let Some(years) = rows.iter().find_map(|row| {
            let years: Vec<i32> = row.iter().filter_map(|c| parse_year(c)).collect();
            (!years.is_empty() && is_year_header(row)).then_some(years)
        }) else {
            continue;
        };
        let Some(current) = rows.iter().find(|row| {
            row.first()
                .is_some_and(|label| labels.contains(&normalize_label(label)))
        }) else {
            continue;
        };
        return align_right(&years, &current[1..]);
    }
    Valuations::new()
}

/// Pair values with years from the right edge; surplus years on the left are
/// dropped. Cells without a number leave their year absent.
fn align_right(years: &[i32], cells: &[String]) -> Valuations {
    years
        .iter()
        .rev()
        .zip(cells.iter().rev())
        .filter_map(|(year, cell)| normalize_currency(cell).map(|v| (*year, v)))
        .collect()
}

/// At least two year cells, with nothing else but a blank or labelled
/// corner cell ("Tax Year") in front of them.
fn is_year_header(row: &[String]) -> bool {
    let is_year = |c: &String| c.split_whitespace().count() == 1 && parse_year(c).is_some();
    let cells = match row.split_first() {
        Some((corner, rest)) if !is_year(corner) => rest,
        _ => row,
    };
    let filled: Vec<&String> = cells.iter().filter(|c| !c.is_empty()).collect();
    filled.len() >= 2 && filled.iter().all(|&c| is_year(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_per_year_is_sparse() {
        let table = rows(&[
            &["Year", "Land", "Building", "Total"],
            &["2024", "$10,000", "$90,000", "$100,000"],
            &["2023", "$10,000", "$85,000", "$95,000"],
            &["2022", "$9,000", "$80,000", "$89,000"],
            &["2021", "$9,000", "$75,000", "$84,000"],
        ]);
        let values = per_year_layout(&[table]);
        assert_eq!(values.len(), 4);
        assert_eq!(values.get(&2021).map(String::as_str), Some("84,000"));
        assert!(!values.contains_key(&2020));
    }

    #[test]
    fn test_per_year_first_occurrence_wins() {
        let first = rows(&[&["2024", "$100,000"]]);
        let second = rows(&[&["2024", "$1"]]);
        let values = per_year_layout(&[first, second]);
        assert_eq!(values.get(&2024).map(String::as_str), Some("100,000"));
    }

    #[test]
    fn test_year_header_is_not_a_per_year_row() {
        let table = rows(&[&["2022", "2023", "2024"], &["Current Value", "$1", "$2", "$3"]]);
        assert!(per_year_layout(&[table]).is_empty());
    }

    #[test]
    fn test_current_value_right_aligned() {
        let table = rows(&[
            &["", "2020", "2021", "2022", "2023", "2024"],
            &["Current Value", "$120,000", "$125,500"],
        ]);
        let values = current_value_layout(&[table], &["Current Value".to_string()]);
        assert_eq!(values.len(), 2);
        assert_eq!(values.get(&2023).map(String::as_str), Some("120,000"));
        assert_eq!(values.get(&2024).map(String::as_str), Some("125,500"));
    }

    #[test]
    fn test_current_value_blank_cell_stays_absent() {
        let table = rows(&[&["2023", "2024"], &["Current:", "", "$7"]]);
        let values = current_value_layout(&[table], &["current".to_string()]);
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(&2024).map(String::as_str), Some("7"));
    }

    #[test]
    fn test_current_value_with_labelled_corner() {
        let table = rows(&[
            &["Tax Year", "2021", "2022"],
            &["Current Value", "$64,000", "$66,500"],
        ]);
        let values = current_value_layout(&[table], &["Current Value".to_string()]);
        assert_eq!(values.len(), 2);
        assert_eq!(values.get(&2021).map(String::as_str), Some("64,000"));
        assert_eq!(values.get(&2022).map(String::as_str), Some("66,500"));
    }

    #[test]
    fn test_labelled_year_header_is_not_a_per_year_row() {
        assert!(is_year_header(&rows(&[&["Tax Year", "2021", "2022"]])[0]));
        assert!(!is_year_header(&rows(&[&["Tax Year", "2021"]])[0]));
        assert!(!is_year_header(&rows(&[&["2024", "$100,000"]])[0]));
    }
}
