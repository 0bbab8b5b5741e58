//! Detail-page extraction.
//!
//! Probes three regions (summary table, valuation tables, property image)
//! independently. A region that cannot be read becomes a note on the record;
//! the remaining regions are still extracted.

mod text;
pub mod valuation;

use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::driver::PageDriver;
use crate::error::{ExtractionError, Region, SessionFault};
use crate::profile::{ExtractionProfile, SiteProfile};
use crate::record::ExtractedRecord;

pub use valuation::Layout;

/// Summary fields read from the label/value table.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    parcel_id: Option<String>,
    property_class: Option<String>,
    tax_district: Option<String>,
    acreage: Option<String>,
}

/// Turns a loaded detail page into an [`ExtractedRecord`].
#[derive(Debug, Clone)]
pub struct Extractor {
    profile: Arc<SiteProfile>,
}

impl Extractor {
    pub fn new(profile: Arc<SiteProfile>) -> Self {
        Self { profile }
    }

    /// Extract from the page the driver is positioned on.
    pub async fn extract(&self, driver: &mut dyn PageDriver) -> Result<ExtractedRecord, SessionFault> {
        let url = match driver.current_url().await {
            Ok(url) => Some(url),
            Err(e) if e.is_session_fault() => return Err(SessionFault(e)),
            Err(_) => None,
        };
        match driver.page_html().await {
            Ok(html) => Ok(self.extract_html(&html, url.as_deref())),
            Err(e) if e.is_session_fault() => Err(SessionFault(e)),
            Err(e) => Ok(ExtractedRecord::builder()
                .report_url(url)
                .note(
                    ExtractionError::Malformed {
                        region: Region::Page,
                        detail: e.to_string(),
                    }
                    .to_string(),
                )
                .build()),
        }
    }

    /// Extract from serialized HTML. Deterministic for a given input.
    pub fn extract_html(&self, html: &str, page_url: Option<&str>) -> ExtractedRecord {
        let doc = Html::parse_document(html);
        let spec = &self.profile.extraction;
        let mut builder = ExtractedRecord::builder().report_url(page_url.map(str::to_string));

        match read_summary(&doc, spec) {
            Ok(summary) => {
                builder = builder
                    .parcel_id(summary.parcel_id)
                    .property_class(summary.property_class)
                    .tax_district(summary.tax_district)
                    .acreage(summary.acreage);
            }
            Err(e) => builder = builder.note(e.to_string()),
        }

        match read_valuations(&doc, spec) {
            Ok((layout, values)) => {
                tracing::debug!(?layout, years = values.len(), "valuations extracted");
                builder = builder.valuations(values);
            }
            Err(e) => builder = builder.note(e.to_string()),
        }

        match read_image(&doc, spec, page_url) {
            Ok(image) => builder = builder.image_url(image),
            Err(e) => builder = builder.note(e.to_string()),
        }

        builder.build()
    }
}

/// All elements matching any of `selectors`, in selector order, without duplicates.
fn select_all<'a>(doc: &'a Html, selectors: &[String]) -> Vec<ElementRef<'a>> {
    let mut found: Vec<ElementRef<'a>> = Vec::new();
    for css in selectors {
        let Ok(selector) = Selector::parse(css) else {
            tracing::warn!(selector = %css, "skipping unparsable selector");
            continue;
        };
        for el in doc.select(&selector) {
            if !found.iter().any(|f| f.id() == el.id()) {
                found.push(el);
            }
        }
    }
    found
}

fn read_summary(doc: &Html, spec: &ExtractionProfile) -> Result<Summary, ExtractionError> {
    let tables = select_all(doc, &spec.summary_tables);
    if tables.is_empty() {
        return Err(ExtractionError::RegionMissing {
            region: Region::Summary,
        });
    }

    let rows = Selector::parse("tr").map_err(|_| ExtractionError::Malformed {
        region: Region::Summary,
        detail: "row selector".into(),
    })?;
    let pairs: Vec<(String, String)> = tables
        .iter()
        .flat_map(|t| t.select(&rows))
        .filter_map(|row| {
            let cells = text::row_cells(&row);
            match cells.as_slice() {
                [label, value, ..] => Some((text::normalize_label(label), value.clone())),
                _ => None,
            }
        })
        .collect();

    let lookup = |labels: &[String]| {
        labels.iter().find_map(|wanted| {
            let wanted = text::normalize_label(wanted);
            pairs
                .iter()
                .find(|(label, value)| *label == wanted && !value.is_empty())
                .map(|(_, value)| value.clone())
        })
    };
    let summary = Summary {
        parcel_id: lookup(&spec.parcel_labels),
        property_class: lookup(&spec.class_labels),
        tax_district: lookup(&spec.tax_district_labels),
        acreage: lookup(&spec.acreage_labels),
    };

    if summary == Summary::default() {
        return Err(ExtractionError::Malformed {
            region: Region::Summary,
            detail: "no known labels".into(),
        });
    }
    Ok(summary)
}

fn read_valuations(
    doc: &Html,
    spec: &ExtractionProfile,
) -> Result<(Layout, valuation::Valuations), ExtractionError> {
    let tables = select_all(doc, &spec.valuation_tables);
    if tables.is_empty() {
        return Err(ExtractionError::RegionMissing {
            region: Region::Valuation,
        });
    }
    valuation::extract_valuations(&tables, &spec.current_value_labels).ok_or_else(|| {
        ExtractionError::Malformed {
            region: Region::Valuation,
            detail: "no year/value rows".into(),
        }
    })
}

/// Optional photo. Absence is not an error; an unresolvable source is.
fn read_image(
    doc: &Html,
    spec: &ExtractionProfile,
    page_url: Option<&str>,
) -> Result<Option<String>, ExtractionError> {
    let src = select_all(doc, &spec.image).into_iter().find_map(|img| {
        img.value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    });
    let Some(src) = src else {
        return Ok(None);
    };

    if let Ok(absolute) = Url::parse(&src) {
        return Ok(Some(absolute.to_string()));
    }
    page_url
        .and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(&src).ok())
        .map(|u| Some(u.to_string()))
        .ok_or_else(|| ExtractionError::Malformed {
            region: Region::Image,
            detail: format!("cannot resolve {src}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://county.test/parcel/001";

    fn extractor() -> Extractor {
        Extractor::new(Arc::new(SiteProfile::default()))
    }

    const PER_YEAR_PAGE: &str = r#"<html><body>
        <table class="tabular-data-two-column">
          <tr><th>Parcel Number</th><td>042 017</td></tr>
          <tr><th>Location Address</th><td>1 MAIN ST</td></tr>
          <tr><th>Class:</th><td>R3-Residential</td></tr>
          <tr><th>Tax District</th><td>Unincorporated (District 01)</td></tr>
          <tr><th>Acres</th><td>1.25</td></tr>
        </table>
        <section id="ctlBodyPane_ctl07_mSection_Valuation"><table>
          <tr><th>Year</th><th>Land</th><th>Improvements</th><th>Total</th></tr>
          <tr><td>2024</td><td>$20,000</td><td>$130,400</td><td>$150,400</td></tr>
          <tr><td>2023</td><td>$20,000</td><td>$121,000</td><td>$141,000</td></tr>
          <tr><td>2022</td><td>$18,000</td><td>$110,000</td><td>$128,000</td></tr>
          <tr><td>2021</td><td>$18,000</td><td>$99,500</td><td>$117,500</td></tr>
        </table></section>
        <img id="ctlBodyPane_imgPhoto" src="/photos/042017.jpg">
    </body></html>"#;

    #[test]
    fn test_full_record_from_per_year_layout() {
        let record = extractor().extract_html(PER_YEAR_PAGE, Some(PAGE));
        assert_eq!(record.parcel_id(), Some("042 017"));
        assert_eq!(record.property_class(), Some("R3-Residential"));
        assert_eq!(record.tax_district(), Some("Unincorporated (District 01)"));
        assert_eq!(record.acreage(), Some("1.25"));
        assert_eq!(record.valuation(2024), Some("150,400"));
        assert_eq!(record.valuation(2021), Some("117,500"));
        assert_eq!(record.valuation(2020), None);
        assert_eq!(record.valuations().len(), 4);
        assert_eq!(
            record.image_url(),
            Some("https://county.test/photos/042017.jpg")
        );
        assert_eq!(record.report_url(), Some(PAGE));
        assert_eq!(record.scrape_error(), None);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let first = extractor().extract_html(PER_YEAR_PAGE, Some(PAGE));
        let second = extractor().extract_html(PER_YEAR_PAGE, Some(PAGE));
        assert_eq!(first, second);
    }

    #[test]
    fn test_current_value_layout() {
        let html = r#"<html><body>
            <table class="tabular-data-two-column"><tr><td>Parcel ID</td><td>9A</td></tr></table>
            <table id="ctlBodyPane_gvwValuation">
              <tr><th></th><th>2021</th><th>2022</th><th>2023</th><th>2024</th></tr>
              <tr><th>Current Value</th><td>$61,000</td><td>$64,250</td></tr>
            </table>
        </body></html>"#;
        let record = extractor().extract_html(html, Some(PAGE));
        assert_eq!(record.parcel_id(), Some("9A"));
        assert_eq!(record.valuation(2023), Some("61,000"));
        assert_eq!(record.valuation(2024), Some("64,250"));
        assert_eq!(record.valuations().len(), 2);
        assert_eq!(record.image_url(), None);
        assert_eq!(record.scrape_error(), None);
    }

    #[test]
    fn test_missing_regions_become_notes() {
        let html = r#"<html><body>
            <table class="tabular-data-two-column"><tr><th>Acres</th><td>3.0</td></tr></table>
        </body></html>"#;
        let record = extractor().extract_html(html, None);
        assert_eq!(record.acreage(), Some("3.0"));
        assert_eq!(record.scrape_error(), Some("valuation: region not found"));
    }

    #[test]
    fn test_unknown_layout_is_partial_not_fatal() {
        let html = r#"<html><body>
            <table class="tabular-data-two-column"><tr><th>Owner</th><td>SMITH</td></tr></table>
            <table id="gvwValuation"><tr><td>n/a</td></tr></table>
            <img id="imgPhoto" src="photo.jpg">
        </body></html>"#;
        let record = extractor().extract_html(html, None);
        assert!(!record.has_data());
        assert_eq!(
            record.scrape_error(),
            Some(
                "summary: no known labels; valuation: no year/value rows; \
                 image: cannot resolve photo.jpg"
            )
        );
    }
}
