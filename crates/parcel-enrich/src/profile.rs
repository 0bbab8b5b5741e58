//! Site profile: every selector, label, URL template, and timeout the
//! navigator and extractor rely on.
//!
//! The default targets the qPublic-style property search (region menu →
//! county menu → "Property Search" application → terms dialog → address
//! search → parcel report). Operators can override any field with a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::Locator;

/// Navigation selectors and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Entry point of the multi-screen flow.
    pub home_url: String,

    /// Region (state) chosen before the jurisdiction menu; `None` skips the step.
    pub region_name: Option<String>,
    pub region_input: Locator,
    /// Options of the region menu; matched by the region name.
    pub region_options: String,

    pub jurisdiction_input: Locator,
    /// Selectable jurisdiction options, excluding filtered-out entries.
    pub jurisdiction_options: String,
    /// Fallback: any link whose text contains the jurisdiction name.
    pub jurisdiction_links: String,

    /// Preferred application entry: a labeled quick-link.
    pub app_quick_link: Locator,
    /// Fallback: any link carrying an application identifier.
    pub app_links: String,
    /// Regex with one capture group extracting the application identifier.
    pub app_id_pattern: String,
    /// Last resort: URL built from a captured identifier (`{app_id}` placeholder).
    pub app_url_template: String,
    /// URL fragment present once inside an application.
    pub app_url_marker: String,

    pub consent_dialog: Locator,
    pub consent_accept: Locator,

    pub search_input: Locator,
    /// Controls that expand a collapsed search section, tried in order.
    pub search_expanders: Vec<Locator>,
    /// Controls that submit the address search, tried in order.
    pub search_submits: Vec<Locator>,

    /// Rows of the disambiguation list.
    pub results_rows: Locator,
    /// Candidate links inside the disambiguation list.
    pub result_links: Locator,
    /// Message shown when the search matched nothing.
    pub no_results: Locator,
    /// Marker that a parcel detail page is loaded.
    pub detail_marker: Locator,

    /// Upper bound for each wait inside a transition.
    pub step_timeout_ms: u64,
    /// How long to look for an optional element (consent dialog, open panel).
    pub probe_timeout_ms: u64,

    pub extraction: ExtractionProfile,
}

impl SiteProfile {
    /// Load a profile from a JSON file; missing fields take default values.
    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ProfileError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let profile: Self = serde_json::from_str(&raw)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check that patterns and selectors parse.
    pub fn validate(&self) -> Result<(), ProfileError> {
        regex::Regex::new(&self.app_id_pattern)
            .map_err(|e| ProfileError::Invalid(format!("app_id_pattern: {e}")))?;
        if !self.app_url_template.contains("{app_id}") {
            return Err(ProfileError::Invalid(
                "app_url_template must contain {app_id}".into(),
            ));
        }
        let mut selectors: Vec<&str> = vec![
            &self.region_input.css,
            &self.region_options,
            &self.jurisdiction_input.css,
            &self.jurisdiction_options,
            &self.jurisdiction_links,
            &self.app_quick_link.css,
            &self.app_links,
            &self.consent_dialog.css,
            &self.consent_accept.css,
            &self.search_input.css,
            &self.results_rows.css,
            &self.result_links.css,
            &self.no_results.css,
            &self.detail_marker.css,
        ];
        selectors.extend(self.search_expanders.iter().map(|l| l.css.as_str()));
        selectors.extend(self.search_submits.iter().map(|l| l.css.as_str()));
        selectors.extend(self.extraction.selectors());
        for css in selectors {
            scraper::Selector::parse(css)
                .map_err(|_| ProfileError::Invalid(format!("bad selector: {css}")))?;
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Application URL for a captured identifier.
    pub fn app_url(&self, app_id: &str) -> String {
        self.app_url_template.replace("{app_id}", app_id)
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            home_url: "https://qpublic.schneidercorp.com/".into(),
            region_name: Some("Georgia".into()),
            region_input: Locator::css("#stateMenuButton"),
            region_options: "#stateMenuContent .dropdown-option".into(),
            jurisdiction_input: Locator::css("#areaMenuButton"),
            jurisdiction_options:
                "#areaMenuContent .dropdown-option:not(.no-match):not(.all-option)".into(),
            jurisdiction_links: "a".into(),
            app_quick_link: Locator::with_text("a", "Property Search"),
            app_links: "a[href*='AppID=']".into(),
            app_id_pattern: r"(?i)AppID=(\d+)".into(),
            app_url_template:
                "https://qpublic.schneidercorp.com/Application.aspx?AppID={app_id}&PageTypeID=2"
                    .into(),
            app_url_marker: "AppID=".into(),
            consent_dialog: Locator::css("div.modal.in"),
            consent_accept: Locator::with_text("div.modal.in a, div.modal.in button", "Agree"),
            search_input: Locator::css("input[id$='txtAddress']"),
            search_expanders: vec![
                Locator::with_text("a[data-toggle='collapse'], button[data-toggle='collapse']", "Search"),
                Locator::with_text("a, button", "Address"),
            ],
            search_submits: vec![
                Locator::css(
                    "a[id$='btnSearch'], button[id$='btnSearch'], input[id$='btnSearch']",
                ),
                Locator::with_text("button, a.btn", "Search"),
            ],
            results_rows: Locator::css("table[id$='gvwParcelResults'] tbody tr"),
            result_links: Locator::css("table[id$='gvwParcelResults'] tbody tr a[href]"),
            no_results: Locator::with_text("div, span, p", "No results match your search"),
            detail_marker: Locator::css("table.tabular-data-two-column"),
            step_timeout_ms: 20_000,
            probe_timeout_ms: 3_000,
            extraction: ExtractionProfile::default(),
        }
    }
}

/// Where the detail-page regions live and how their labels read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionProfile {
    /// Two-column label/value summary tables, tried in order.
    pub summary_tables: Vec<String>,
    pub parcel_labels: Vec<String>,
    pub class_labels: Vec<String>,
    pub tax_district_labels: Vec<String>,
    pub acreage_labels: Vec<String>,
    /// Tables that may hold valuation data (either layout).
    pub valuation_tables: Vec<String>,
    /// Row labels of the current-value row in the year-header layout.
    pub current_value_labels: Vec<String>,
    /// Property photo, tried in order.
    pub image: Vec<String>,
}

impl ExtractionProfile {
    fn selectors(&self) -> impl Iterator<Item = &str> {
        self.summary_tables
            .iter()
            .chain(self.valuation_tables.iter())
            .chain(self.image.iter())
            .map(String::as_str)
    }
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            summary_tables: owned(&[
                "table.tabular-data-two-column",
                "section[id*='Summary'] table",
                "table[id*='Summary']",
            ]),
            parcel_labels: owned(&["Parcel Number", "Parcel ID", "Parcel No", "Map/Parcel", "Parcel"]),
            class_labels: owned(&["Class", "Property Class", "Class Code"]),
            tax_district_labels: owned(&["Tax District", "District"]),
            acreage_labels: owned(&["Acres", "Acreage", "Total Acres"]),
            valuation_tables: owned(&[
                "section[id*='Valuation'] table",
                "table[id*='Valuation']",
                "section[id*='Assessment'] table",
                "table[id*='Assessment']",
            ]),
            current_value_labels: owned(&["Current Value", "Current Year Value", "Current"]),
            image: owned(&[
                "img[id*='Photo']",
                "section[id*='Photo'] img",
                "a[id*='Photo'] img",
            ]),
        }
    }
}

/// Errors loading a profile.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("cannot read profile {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("profile JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid profile: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_profile_is_valid() {
        SiteProfile::default().validate().unwrap();
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"home_url":"https://example.test/","region_name":null,"step_timeout_ms":50}}"#
        )
        .unwrap();
        let profile = SiteProfile::from_file(file.path()).unwrap();
        assert_eq!(profile.home_url, "https://example.test/");
        assert!(profile.region_name.is_none());
        assert_eq!(profile.step_timeout(), Duration::from_millis(50));
        assert_eq!(profile.search_input, SiteProfile::default().search_input);
    }

    #[test]
    fn test_invalid_template_rejected() {
        let profile = SiteProfile {
            app_url_template: "https://example.test/app".into(),
            ..SiteProfile::default()
        };
        assert!(matches!(profile.validate(), Err(ProfileError::Invalid(_))));
    }

    #[test]
    fn test_app_url() {
        let profile = SiteProfile::default();
        assert!(profile.app_url("712").contains("AppID=712&"));
    }
}
