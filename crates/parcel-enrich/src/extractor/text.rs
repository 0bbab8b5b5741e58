//! Cell text helpers shared by the region extractors.

use scraper::ElementRef;

use crate::driver::normalize_text;

/// Earliest and latest year accepted as a valuation year.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

/// Whitespace-normalized text of an element.
pub fn cell_text(el: &ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Direct `th`/`td` children of a table row, as text.
pub fn row_cells(row: &ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "th" | "td"))
        .map(|c| cell_text(&c))
        .collect()
}

/// Lowercased label with a trailing colon removed.
pub fn normalize_label(label: &str) -> String {
    normalize_text(label.trim_end_matches(':'))
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
}

/// A four-digit year at the start of a cell (`"2024"`, `"2024 Tax Year"`).
pub fn parse_year(cell: &str) -> Option<i32> {
    let token = cell.split_whitespace().next()?;
    if token.len() != 4 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = token.parse().ok()?;
    YEAR_RANGE.contains(&year).then_some(year)
}

/// Strip currency symbols and whitespace, keeping digits, grouping commas,
/// the decimal point and a leading minus. `None` when no digit remains.
pub fn normalize_currency(cell: &str) -> Option<String> {
    let kept: String = cell
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    let kept = kept.trim_matches(|c| c == ',' || c == '.');
    if kept.bytes().any(|b| b.is_ascii_digit()) {
        Some(kept.to_string())
    } else {
        None
    }
}
