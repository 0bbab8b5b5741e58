//! `parcel-enrich extract`: offline extraction of a saved detail page.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use parcel_enrich::config;
use parcel_enrich::Extractor;

/// Print the record extracted from `html` as pretty JSON.
pub fn run(html: &Path, url: Option<&str>, profile: Option<&Path>) -> Result<()> {
    let profile = config::load_profile(profile).context("loading site profile")?;
    let page = std::fs::read_to_string(html)
        .with_context(|| format!("reading {}", html.display()))?;

    let record = Extractor::new(Arc::new(profile)).extract_html(&page, url);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_saved_page() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("report.html");
        std::fs::write(
            &page,
            r#"<table class="tabular-data-two-column">
                 <tr><th>Parcel Number</th><td>001 042</td></tr>
               </table>"#,
        )
        .unwrap();
        run(&page, Some("https://county.test/parcel/001"), None).unwrap();
    }

    #[test]
    fn test_extract_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("nope.html"), None, None).is_err());
    }
}
